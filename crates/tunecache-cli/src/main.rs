//! tunecache: shared audio cache for session-scoped downloads.
//!
//! `serve` runs the worker pool and the garbage-collection scheduler; the other
//! subcommands act on the same database from the command line.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use tunecache_cli::{fit_column, queue_config, Services};
use tunecache_core::Config;
use tunecache_db::TaskRepository;
use tunecache_infra::{init_telemetry, shutdown_telemetry, RateLimiter};
use tunecache_services::AppContext;
use tunecache_worker::{GcScheduler, TaskHandlerContext, TaskQueue};

#[derive(Parser)]
#[command(name = "tunecache", about = "Shared audio cache")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker pool and the garbage collector until interrupted
    Serve,
    /// Queue acquisitions for a video or playlist URL
    Submit {
        url: String,
        #[arg(long)]
        session: String,
    },
    /// List what a session currently holds
    List {
        #[arg(long)]
        session: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Release a session's claim on a file and print its path
    Consume {
        #[arg(long)]
        session: String,
        /// Stored file name; omit with --all
        file_name: Option<String>,
        /// Consume everything the session holds
        #[arg(long, conflicts_with = "file_name")]
        all: bool,
    },
    /// Run one garbage collection cycle now
    Gc,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.validate()?;
    init_telemetry(config.environment())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let services = Services::build(&config).await?;

    match cli.command {
        Commands::Serve => serve(&config, services).await?,
        Commands::Submit { url, session } => {
            let task_ids = services.request_service(&config).submit_url(&url, &session).await?;
            print_json(&serde_json::json!({ "accepted": task_ids }))?;
        }
        Commands::List { session, json } => {
            let views = services.consumption.list_associations(&session).await?;
            if json {
                print_json(&views)?;
            } else {
                for view in views {
                    println!(
                        "{:<40} {:<24} {:>8} {:>8}  {}",
                        fit_column(&view.title, 40),
                        fit_column(&view.author, 24),
                        view.size,
                        view.length,
                        view.file_name
                    );
                }
            }
        }
        Commands::Consume {
            session,
            file_name,
            all,
        } => {
            let paths = match (all, file_name) {
                (true, _) => services.consumption.consume_all(&session).await?,
                (false, Some(file_name)) => services
                    .consumption
                    .consume(&session, &file_name)
                    .await?
                    .into_iter()
                    .collect(),
                (false, None) => anyhow::bail!("Pass a file name or --all"),
            };
            print_json(&paths)?;
        }
        Commands::Gc => {
            let report = services.collector.run_cycle().await?;
            print_json(&report)?;
        }
    }

    shutdown_telemetry().await;
    Ok(())
}

async fn serve(config: &Config, services: Services) -> anyhow::Result<()> {
    // The queue only holds a weak reference; this binding keeps the context alive.
    let context: Arc<dyn TaskHandlerContext> = Arc::new(AppContext {
        pipeline: services.pipeline,
        collector: services.collector,
    });

    let queue = TaskQueue::new(
        TaskRepository::new(services.pool.clone()),
        RateLimiter::new(config.acquisition_rate_limit_per_minute()),
        queue_config(config),
        Arc::downgrade(&context),
    );
    let scheduler = GcScheduler::new(queue.clone(), config.gc_interval()).start();

    tracing::info!(
        workers = config.task_queue_max_workers(),
        media_dir = %config.media_dir().display(),
        "tunecache serving"
    );

    shutdown_signal().await;

    scheduler.abort();
    queue.shutdown().await;
    services.pool.close().await;
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }
}
