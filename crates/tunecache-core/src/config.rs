//! Configuration module
//!
//! This module provides the configuration structures for the worker process,
//! including database, media directory, task queue, cache lifetime and external
//! tool settings. Values come from the environment (and an optional `.env` file).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

// Common constants
const MAX_CONNECTIONS: u32 = 8;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const DATABASE_URL: &str = "sqlite://tunecache.db";
const MEDIA_DIR: &str = "songs";

/// Base configuration shared by every binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
}

/// Cache worker configuration
#[derive(Clone, Debug)]
pub struct TuneCacheConfig {
    pub base: BaseConfig,
    pub media_dir: PathBuf,
    // Task queue configuration
    pub task_queue_max_workers: usize,
    pub task_queue_poll_interval_ms: u64,
    pub acquisition_rate_limit_per_minute: u32,
    pub task_queue_default_timeout_seconds: i32,
    pub task_queue_max_retries: i32,
    /// Interval in seconds between runs of the stale task reaper. 0 = disabled.
    pub task_queue_stale_task_reap_interval_secs: u64,
    /// Grace period in seconds added to task timeout before reaping stale running tasks.
    pub task_queue_stale_task_grace_period_secs: i64,
    /// Retention in days for finished tasks. 0 = keep forever.
    pub task_retention_days: i32,
    // Cache lifetimes
    pub gc_interval_secs: u64,
    pub association_ttl_secs: u64,
    pub media_ttl_secs: u64,
    pub media_extension_secs: u64,
    // Acquisition pipeline
    pub target_container: String,
    pub fetch_max_retries: u32,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<TuneCacheConfig>);

impl Config {
    fn inner(&self) -> &TuneCacheConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.inner().base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = TuneCacheConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn database_url(&self) -> &str {
        &self.inner().base.database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.inner().base.db_timeout_seconds)
    }

    pub fn media_dir(&self) -> &PathBuf {
        &self.inner().media_dir
    }

    pub fn task_queue_max_workers(&self) -> usize {
        self.inner().task_queue_max_workers
    }

    pub fn task_queue_poll_interval_ms(&self) -> u64 {
        self.inner().task_queue_poll_interval_ms
    }

    pub fn acquisition_rate_limit_per_minute(&self) -> u32 {
        self.inner().acquisition_rate_limit_per_minute
    }

    pub fn task_queue_default_timeout_seconds(&self) -> i32 {
        self.inner().task_queue_default_timeout_seconds
    }

    pub fn task_queue_max_retries(&self) -> i32 {
        self.inner().task_queue_max_retries
    }

    pub fn task_queue_stale_task_reap_interval_secs(&self) -> u64 {
        self.inner().task_queue_stale_task_reap_interval_secs
    }

    pub fn task_queue_stale_task_grace_period_secs(&self) -> i64 {
        self.inner().task_queue_stale_task_grace_period_secs
    }

    pub fn task_retention_days(&self) -> i32 {
        self.inner().task_retention_days
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.inner().gc_interval_secs)
    }

    pub fn association_ttl(&self) -> Duration {
        Duration::from_secs(self.inner().association_ttl_secs)
    }

    pub fn media_ttl(&self) -> Duration {
        Duration::from_secs(self.inner().media_ttl_secs)
    }

    pub fn media_extension(&self) -> Duration {
        Duration::from_secs(self.inner().media_extension_secs)
    }

    pub fn target_container(&self) -> &str {
        &self.inner().target_container
    }

    pub fn fetch_max_retries(&self) -> u32 {
        self.inner().fetch_max_retries
    }

    pub fn ytdlp_path(&self) -> &str {
        &self.inner().ytdlp_path
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.inner().ffmpeg_path
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl TuneCacheConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const TASK_QUEUE_MAX_WORKERS: usize = 4;
        const TASK_QUEUE_POLL_INTERVAL_MS: u64 = 500;
        const TASK_QUEUE_DEFAULT_TIMEOUT_SECS: i32 = 3600;
        const TASK_QUEUE_MAX_RETRIES: i32 = 3;
        const STALE_TASK_REAP_INTERVAL_SECS: u64 = 60;
        const STALE_TASK_GRACE_PERIOD_SECS: i64 = 300;
        const TASK_RETENTION_DAYS: i32 = 7;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let base = BaseConfig {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| DATABASE_URL.to_string()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            environment,
        };

        let acquisition_rate_limit_per_minute = match env::var("ACQUISITION_RATE_LIMIT_PER_MINUTE")
        {
            Ok(v) => v.trim().parse::<u32>().map_err(|_| {
                anyhow::anyhow!("ACQUISITION_RATE_LIMIT_PER_MINUTE must be a positive integer")
            })?,
            Err(_) => constants::ACQUISITION_RATE_LIMIT_PER_MINUTE,
        };

        Ok(TuneCacheConfig {
            base,
            media_dir: PathBuf::from(env::var("MEDIA_DIR").unwrap_or_else(|_| MEDIA_DIR.to_string())),
            task_queue_max_workers: env_or("TASK_QUEUE_MAX_WORKERS", TASK_QUEUE_MAX_WORKERS),
            task_queue_poll_interval_ms: env_or(
                "TASK_QUEUE_POLL_INTERVAL_MS",
                TASK_QUEUE_POLL_INTERVAL_MS,
            ),
            acquisition_rate_limit_per_minute,
            task_queue_default_timeout_seconds: env_or(
                "TASK_QUEUE_DEFAULT_TIMEOUT_SECONDS",
                TASK_QUEUE_DEFAULT_TIMEOUT_SECS,
            ),
            task_queue_max_retries: env_or("TASK_QUEUE_MAX_RETRIES", TASK_QUEUE_MAX_RETRIES),
            task_queue_stale_task_reap_interval_secs: env_or(
                "TASK_QUEUE_STALE_TASK_REAP_INTERVAL_SECS",
                STALE_TASK_REAP_INTERVAL_SECS,
            ),
            task_queue_stale_task_grace_period_secs: env_or(
                "TASK_QUEUE_STALE_TASK_GRACE_PERIOD_SECS",
                STALE_TASK_GRACE_PERIOD_SECS,
            ),
            task_retention_days: env_or("TASK_RETENTION_DAYS", TASK_RETENTION_DAYS),
            gc_interval_secs: env_or("GC_INTERVAL_SECS", constants::GC_INTERVAL.as_secs()),
            association_ttl_secs: env_or(
                "ASSOCIATION_TTL_SECS",
                constants::ASSOCIATION_TTL.as_secs(),
            ),
            media_ttl_secs: env_or("MEDIA_TTL_SECS", constants::MEDIA_TTL.as_secs()),
            media_extension_secs: env_or("MEDIA_EXTENSION_SECS", constants::MEDIA_TTL.as_secs()),
            target_container: env::var("TARGET_CONTAINER")
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_else(|_| constants::DEFAULT_TARGET_CONTAINER.to_string()),
            fetch_max_retries: env_or("FETCH_MAX_RETRIES", constants::FETCH_MAX_RETRIES),
            ytdlp_path: env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.base.database_url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a SQLite connection string (sqlite://...)"
            ));
        }

        if self.task_queue_max_workers == 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_WORKERS must be at least 1"));
        }

        if self.acquisition_rate_limit_per_minute == 0 {
            return Err(anyhow::anyhow!(
                "ACQUISITION_RATE_LIMIT_PER_MINUTE must be at least 1"
            ));
        }

        if self.gc_interval_secs == 0 {
            return Err(anyhow::anyhow!("GC_INTERVAL_SECS must be at least 1"));
        }

        if self.target_container.is_empty() {
            return Err(anyhow::anyhow!("TARGET_CONTAINER must not be empty"));
        }

        Ok(())
    }
}
