//! Wiring shared by the `tunecache` subcommands.

use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;

use tunecache_core::Config;
use tunecache_db::{create_pool, AssociationRepository, DatabaseConfig, MediaRepository, TaskRepository};
use tunecache_services::providers::{
    FfmpegTranscoder, HttpCoverSource, HttpFetcher, LoftyTagger, YtDlpProvider,
};
use tunecache_services::{
    AcquisitionConfig, AcquisitionPipeline, ConsumptionService, GarbageCollector, KeyedLock,
    LocalStorage, Providers, RequestService, Storage,
};
use tunecache_worker::{TaskQueue, TaskQueueConfig};

/// Store, media directory and services built from one configuration.
pub struct Services {
    pub pool: SqlitePool,
    pub providers: Providers,
    pub pipeline: AcquisitionPipeline,
    pub collector: GarbageCollector,
    pub consumption: ConsumptionService,
}

impl Services {
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let db_config = DatabaseConfig::new(config.database_url())
            .max_connections(config.db_max_connections())
            .acquire_timeout(config.db_timeout());
        let pool = create_pool(db_config).await?;

        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(config.media_dir())
                .await
                .context("Failed to open media directory")?,
        );

        let providers = Providers {
            metadata: Arc::new(YtDlpProvider::new(config.ytdlp_path())),
            fetcher: Arc::new(HttpFetcher::new(config.fetch_max_retries())?),
            transcoder: Arc::new(FfmpegTranscoder::new(config.ffmpeg_path())),
            tagger: Arc::new(LoftyTagger::new()),
            covers: Arc::new(HttpCoverSource::new()?),
        };

        // Acquisition and collection must agree on who holds a title.
        let locks = Arc::new(KeyedLock::new());

        let pipeline = AcquisitionPipeline::new(
            pool.clone(),
            storage.clone(),
            providers.clone(),
            locks.clone(),
            AcquisitionConfig::from_config(config)?,
        );

        let associations = AssociationRepository::new(pool.clone());
        let association_ttl = chrono::TimeDelta::from_std(config.association_ttl())
            .context("ASSOCIATION_TTL_SECS out of range")?;
        let collector = GarbageCollector::new(
            associations.clone(),
            MediaRepository::new(pool.clone()),
            storage.clone(),
            locks,
        )
        .with_association_ttl(association_ttl);

        let consumption = ConsumptionService::new(associations, storage);

        Ok(Self {
            pool,
            providers,
            pipeline,
            collector,
            consumption,
        })
    }

    /// Request service over a queue that only enqueues; a `serve` process runs
    /// the jobs.
    pub fn request_service(&self, config: &Config) -> RequestService {
        let queue = TaskQueue::new_no_worker(
            TaskRepository::new(self.pool.clone()),
            queue_config(config),
        );
        RequestService::new(
            queue,
            AssociationRepository::new(self.pool.clone()),
            self.providers.metadata.clone(),
        )
    }
}

pub fn queue_config(config: &Config) -> TaskQueueConfig {
    TaskQueueConfig {
        max_workers: config.task_queue_max_workers(),
        poll_interval_ms: config.task_queue_poll_interval_ms(),
        default_timeout_seconds: config.task_queue_default_timeout_seconds(),
        max_retries: config.task_queue_max_retries(),
        stale_task_reap_interval_secs: config.task_queue_stale_task_reap_interval_secs(),
        stale_task_grace_period_secs: config.task_queue_stale_task_grace_period_secs(),
        task_retention_days: config.task_retention_days(),
    }
}

/// Fit `s` into `width` characters for table output, ending in "..." when cut.
pub fn fit_column(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
