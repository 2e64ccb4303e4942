use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use tunecache_core::constants::{DEFAULT_TARGET_CONTAINER, MEDIA_TTL, OUTPUT_EXTENSION};
use tunecache_core::models::{file_stem_for_title, Media, NewMedia, TagSet};
use tunecache_core::Config;
use tunecache_db::{
    is_unique_violation, AssociationRepository, ClientRepository, MediaRepository,
    TransactionGuard,
};
use tunecache_storage::Storage;

use super::error::AcquisitionError;
use super::keyed_lock::KeyedLock;
use super::{file_key, title_key};
use crate::providers::{
    CoverSource, FetchService, MetadataProvider, ProviderError, ResolvedMedia, StreamDescriptor,
    TaggingService, TranscodeService,
};

/// Compare-and-swap attempts before an extension gives up.
const MAX_EXTEND_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub target_container: String,
    /// Lifetime of a newly created media row.
    pub media_ttl: TimeDelta,
    /// Added to the current expiration on every cache hit.
    pub media_extension: TimeDelta,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        let ttl = TimeDelta::seconds(MEDIA_TTL.as_secs() as i64);
        Self {
            target_container: DEFAULT_TARGET_CONTAINER.to_string(),
            media_ttl: ttl,
            media_extension: ttl,
        }
    }
}

impl AcquisitionConfig {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            target_container: config.target_container().to_string(),
            media_ttl: TimeDelta::from_std(config.media_ttl()).context("MEDIA_TTL_SECS out of range")?,
            media_extension: TimeDelta::from_std(config.media_extension())
                .context("MEDIA_EXTENSION_SECS out of range")?,
        })
    }
}

/// The external collaborators an acquisition calls out to.
#[derive(Clone)]
pub struct Providers {
    pub metadata: Arc<dyn MetadataProvider>,
    pub fetcher: Arc<dyn FetchService>,
    pub transcoder: Arc<dyn TranscodeService>,
    pub tagger: Arc<dyn TaggingService>,
    pub covers: Arc<dyn CoverSource>,
}

/// How an acquisition job ended. Serialized as the task result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcquisitionOutcome {
    Created { media_id: Uuid, file_name: String },
    Extended { media_id: Uuid, associated: bool },
    NoCompatibleStream { content_id: String },
}

enum ExtendAttempt {
    Missing,
    Conflict,
    Done(AcquisitionOutcome),
}

/// Turns a content identifier into a cached, tagged file associated with the
/// requesting session.
///
/// All store writes of one run commit in a single transaction. Runs for the same
/// title are serialized in-process by the shared [`KeyedLock`]; across processes
/// the UNIQUE title index decides, and the loser falls back to the hit path.
#[derive(Clone)]
pub struct AcquisitionPipeline {
    pool: SqlitePool,
    media: MediaRepository,
    storage: Arc<dyn Storage>,
    providers: Providers,
    locks: Arc<KeyedLock>,
    config: AcquisitionConfig,
}

impl AcquisitionPipeline {
    pub fn new(
        pool: SqlitePool,
        storage: Arc<dyn Storage>,
        providers: Providers,
        locks: Arc<KeyedLock>,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            media: MediaRepository::new(pool.clone()),
            pool,
            storage,
            providers,
            locks,
            config,
        }
    }

    pub async fn run(
        &self,
        content_id: &str,
        session_token: &str,
    ) -> Result<AcquisitionOutcome, AcquisitionError> {
        self.run_at(content_id, session_token, Utc::now()).await
    }

    /// Run with `now` as the request time of any association and the creation
    /// time of any media row.
    #[tracing::instrument(skip(self, session_token), fields(content_id = %content_id))]
    pub async fn run_at(
        &self,
        content_id: &str,
        session_token: &str,
        now: DateTime<Utc>,
    ) -> Result<AcquisitionOutcome, AcquisitionError> {
        let resolved = self
            .providers
            .metadata
            .resolve(content_id)
            .await
            .map_err(|source| AcquisitionError::UnresolvableIdentifier {
                content_id: content_id.to_string(),
                source,
            })?;

        let stream = match self.select_stream(&resolved) {
            Ok(stream) => stream,
            Err(e @ AcquisitionError::NoCompatibleStream { .. }) => {
                tracing::info!(error = %e, "Skipping content without a compatible stream");
                return Ok(AcquisitionOutcome::NoCompatibleStream {
                    content_id: content_id.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let _title_guard = self.locks.lock(&title_key(&resolved.title)).await;

        if let Some(outcome) = self.extend_existing(&resolved.title, session_token, now).await? {
            return Ok(outcome);
        }

        self.acquire_new(&resolved, &stream, session_token, now).await
    }

    fn select_stream(&self, resolved: &ResolvedMedia) -> Result<StreamDescriptor, AcquisitionError> {
        resolved
            .select_stream(&self.config.target_container)
            .cloned()
            .ok_or_else(|| AcquisitionError::NoCompatibleStream {
                content_id: resolved.content_id.clone(),
                container: self.config.target_container.clone(),
            })
    }

    /// Hit path. Returns `None` when no row carries the title.
    async fn extend_existing(
        &self,
        title: &str,
        session_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AcquisitionOutcome>, AcquisitionError> {
        for attempt in 1..=MAX_EXTEND_ATTEMPTS {
            match self.extend_once(title, session_token, now).await? {
                ExtendAttempt::Missing => return Ok(None),
                ExtendAttempt::Done(outcome) => return Ok(Some(outcome)),
                ExtendAttempt::Conflict => {
                    tracing::debug!(attempt, title = %title, "Expiration changed concurrently, retrying");
                }
            }
        }
        Err(AcquisitionError::StoreUnavailable(anyhow::anyhow!(
            "expiration of {:?} kept changing after {} attempts",
            title,
            MAX_EXTEND_ATTEMPTS
        )))
    }

    async fn extend_once(
        &self,
        title: &str,
        session_token: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ExtendAttempt> {
        let mut tx = TransactionGuard::begin_immediate(&self.pool, "cache hit").await?;
        let extension = self.config.media_extension;

        let result: anyhow::Result<ExtendAttempt> = async {
            let conn = tx.conn()?;
            let Some(media) = MediaRepository::find_by_title_in(&mut *conn, title).await? else {
                return Ok(ExtendAttempt::Missing);
            };

            let extended = media.expiration + extension;
            if !MediaRepository::extend_expiration_in(&mut *conn, media.id, media.expiration, extended)
                .await?
            {
                return Ok(ExtendAttempt::Conflict);
            }

            let client = ClientRepository::get_or_create_in(&mut *conn, session_token, now).await?;
            let associated = if AssociationRepository::exists_in(&mut *conn, client.id, media.id).await? {
                false
            } else {
                AssociationRepository::create_in(&mut *conn, client.id, media.id, now).await?;
                true
            };

            tracing::info!(
                media_id = %media.id,
                title = %media.title,
                expiration = %extended,
                associated,
                "Cache hit, expiration extended"
            );
            Ok(ExtendAttempt::Done(AcquisitionOutcome::Extended {
                media_id: media.id,
                associated,
            }))
        }
        .await;

        match result {
            Ok(ExtendAttempt::Done(outcome)) => {
                tx.commit().await?;
                Ok(ExtendAttempt::Done(outcome))
            }
            Ok(other) => {
                tx.rollback().await?;
                Ok(other)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after failed cache hit failed");
                }
                Err(e)
            }
        }
    }

    /// Miss path: download, convert, tag, then persist everything in one commit.
    async fn acquire_new(
        &self,
        resolved: &ResolvedMedia,
        stream: &StreamDescriptor,
        session_token: &str,
        now: DateTime<Utc>,
    ) -> Result<AcquisitionOutcome, AcquisitionError> {
        let (stem, _file_guard) = self.reserve_stem(resolved).await?;
        let file_name = format!("{}.{}", stem, OUTPUT_EXTENSION);
        let source_path = self.path_for(&format!("{}.{}", stem, stream.container))?;
        let target_path = self.path_for(&file_name)?;

        tracing::info!(title = %resolved.title, file_name = %file_name, "Cache miss, acquiring");

        // Removes both files unless a row ends up owning the target, including
        // when this future is dropped mid-step by a task timeout.
        let mut staged = StagedFiles::new(vec![source_path.clone(), target_path.clone()]);

        let size_bytes = self
            .process_files(resolved, stream, &source_path, &target_path)
            .await?;

        let new_media = NewMedia {
            title: resolved.title.clone(),
            content_id: resolved.content_id.clone(),
            channel: resolved.author.clone(),
            thumbnail_url: resolved.thumbnail_url.clone(),
            duration_seconds: resolved.duration_seconds,
            size_bytes,
            file_name: file_name.clone(),
        };

        match self.persist(&new_media, session_token, now).await {
            Ok(media) => {
                staged.keep();
                tracing::info!(
                    media_id = %media.id,
                    title = %media.title,
                    expiration = %media.expiration,
                    "Media acquired"
                );
                Ok(AcquisitionOutcome::Created {
                    media_id: media.id,
                    file_name,
                })
            }
            Err(e) if is_title_conflict(&e) => {
                // Another process committed this title first and wrote the same file.
                tracing::warn!(title = %resolved.title, "Lost title race, reusing existing media");
                staged.keep();
                self.extend_existing(&resolved.title, session_token, now)
                    .await?
                    .ok_or_else(|| {
                        AcquisitionError::StoreUnavailable(anyhow::anyhow!(
                            "title {:?} conflicted but no row was found",
                            resolved.title
                        ))
                    })
            }
            Err(e) => Err(AcquisitionError::StoreUnavailable(e)),
        }
    }

    /// Pick a file stem no other title uses and lock it for the rest of the run.
    async fn reserve_stem(
        &self,
        resolved: &ResolvedMedia,
    ) -> Result<(String, tokio::sync::OwnedMutexGuard<()>), AcquisitionError> {
        let base = file_stem_for_title(&resolved.title, &resolved.content_id);
        let candidates = [
            base.clone(),
            file_stem_for_title(&format!("{} [{}]", base, resolved.content_id), &resolved.content_id),
        ];

        for stem in candidates {
            let file_name = format!("{}.{}", stem, OUTPUT_EXTENSION);
            let guard = self.locks.lock(&file_key(&file_name)).await;
            match self.media.find_by_file_name(&file_name).await? {
                Some(other) if other.title != resolved.title => {
                    tracing::debug!(file_name = %file_name, other_title = %other.title, "File name taken");
                }
                _ => return Ok((stem, guard)),
            }
        }

        Err(AcquisitionError::TransferFailure(ProviderError::Io(
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("no free file name for {:?}", resolved.title),
            ),
        )))
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, AcquisitionError> {
        self.storage.path_for(key).map_err(|e| {
            AcquisitionError::TransferFailure(ProviderError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                e,
            )))
        })
    }

    /// Download, convert and tag. Returns the byte size to record.
    async fn process_files(
        &self,
        resolved: &ResolvedMedia,
        stream: &StreamDescriptor,
        source_path: &Path,
        target_path: &Path,
    ) -> Result<i64, AcquisitionError> {
        let downloaded = self
            .providers
            .fetcher
            .download(stream, source_path)
            .await
            .map_err(AcquisitionError::TransferFailure)?;

        let size_bytes = match stream.size_bytes {
            Some(size) => size,
            None => tokio::fs::metadata(&downloaded)
                .await
                .map(|m| m.len() as i64)
                .unwrap_or(0),
        };

        let converted = self
            .providers
            .transcoder
            .convert(&downloaded)
            .await
            .map_err(AcquisitionError::ConversionFailure)?;
        if converted != target_path {
            tokio::fs::rename(&converted, target_path)
                .await
                .map_err(|e| AcquisitionError::ConversionFailure(ProviderError::Io(e)))?;
        }

        let cover = self.fetch_cover(&resolved.thumbnail_url).await;
        let tags = TagSet::resolve(resolved.track.as_ref(), &resolved.title, &resolved.author);
        self.providers
            .tagger
            .tag(target_path, &tags, cover.as_deref())
            .await
            .map_err(AcquisitionError::TaggingFailure)?;

        Ok(size_bytes)
    }

    /// Cover art is optional; a failed fetch only drops the picture.
    async fn fetch_cover(&self, thumbnail_url: &str) -> Option<Vec<u8>> {
        if thumbnail_url.is_empty() {
            return None;
        }
        match self.providers.covers.fetch(thumbnail_url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, thumbnail_url = %thumbnail_url, "Cover fetch failed, tagging without cover");
                None
            }
        }
    }

    async fn persist(
        &self,
        new_media: &NewMedia,
        session_token: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Media> {
        let mut tx = TransactionGuard::begin_immediate(&self.pool, "acquisition").await?;
        let expiration = now + self.config.media_ttl;

        let result: anyhow::Result<Media> = async {
            let conn = tx.conn()?;
            let client = ClientRepository::get_or_create_in(&mut *conn, session_token, now).await?;
            let media = MediaRepository::create_in(&mut *conn, new_media, now, expiration).await?;
            AssociationRepository::create_in(&mut *conn, client.id, media.id, now).await?;
            Ok(media)
        }
        .await;

        match result {
            Ok(media) => {
                tx.commit().await?;
                Ok(media)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after failed persist failed");
                }
                Err(e)
            }
        }
    }
}

fn is_title_conflict(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .map(is_unique_violation)
        .unwrap_or(false)
}

/// Files written by an in-progress miss path. Dropping the guard without
/// [`StagedFiles::keep`] deletes them.
struct StagedFiles {
    paths: Vec<PathBuf>,
}

impl StagedFiles {
    fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    fn keep(&mut self) {
        self.paths.clear();
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        // Synchronous: a cancelled future gets no chance to await.
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed partial file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(error = %e, path = %path.display(), "Failed to remove partial file"),
            }
        }
    }
}
