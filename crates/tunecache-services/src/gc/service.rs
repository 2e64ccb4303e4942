use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tunecache_core::constants::ASSOCIATION_TTL;
use tunecache_db::{AssociationRepository, MediaRepository};
use tunecache_storage::{Storage, StorageError};

use crate::acquisition::{file_key, title_key, KeyedLock};

/// Counts from one collection cycle. Serialized as the task result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub associations_deleted: u64,
    pub media_deleted: u64,
    pub files_deleted: u64,
    pub files_missing: u64,
}

/// Reclaims stale associations, then orphaned expired media and their files.
#[derive(Clone)]
pub struct GarbageCollector {
    associations: AssociationRepository,
    media: MediaRepository,
    storage: Arc<dyn Storage>,
    locks: Arc<KeyedLock>,
    association_ttl: TimeDelta,
}

impl GarbageCollector {
    pub fn new(
        associations: AssociationRepository,
        media: MediaRepository,
        storage: Arc<dyn Storage>,
        locks: Arc<KeyedLock>,
    ) -> Self {
        Self {
            associations,
            media,
            storage,
            locks,
            association_ttl: TimeDelta::seconds(ASSOCIATION_TTL.as_secs() as i64),
        }
    }

    pub fn with_association_ttl(mut self, ttl: TimeDelta) -> Self {
        self.association_ttl = ttl;
        self
    }

    pub async fn run_cycle(&self) -> anyhow::Result<GcReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// One cycle evaluated at `now`. Associations go first so media orphaned in
    /// this cycle are collected in the same cycle.
    #[tracing::instrument(skip(self), fields(gc.now = %now))]
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> anyhow::Result<GcReport> {
        let mut report = GcReport {
            associations_deleted: self
                .associations
                .delete_older_than(now - self.association_ttl)
                .await?,
            ..GcReport::default()
        };

        let candidates = self.media.list_orphaned_expired(now).await?;
        for media in candidates {
            let _title_guard = self.locks.lock(&title_key(&media.title)).await;
            let _file_guard = self.locks.lock(&file_key(&media.file_name)).await;

            // A cache hit may have re-associated the row since it was listed.
            match self.media.delete_if_orphaned_expired(media.id, now).await {
                Ok(true) => report.media_deleted += 1,
                Ok(false) => {
                    tracing::debug!(media_id = %media.id, "Media revived since listing, keeping");
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, media_id = %media.id, "Failed to delete media row");
                    continue;
                }
            }

            match self.storage.delete(&media.file_name).await {
                Ok(()) => report.files_deleted += 1,
                Err(StorageError::NotFound(_)) => {
                    report.files_missing += 1;
                    tracing::warn!(
                        media_id = %media.id,
                        file_name = %media.file_name,
                        "Stored file already missing"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        media_id = %media.id,
                        file_name = %media.file_name,
                        "Failed to delete stored file, row already removed"
                    );
                }
            }
        }

        tracing::info!(
            associations_deleted = report.associations_deleted,
            media_deleted = report.media_deleted,
            files_deleted = report.files_deleted,
            files_missing = report.files_missing,
            "Garbage collection cycle completed"
        );
        Ok(report)
    }
}
