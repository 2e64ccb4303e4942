//! In-memory providers and a temporary cache for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;

use tunecache_core::models::{TagSet, TrackInfo};
use tunecache_db::{create_pool, AssociationRepository, DatabaseConfig, MediaRepository};
use tunecache_services::providers::{
    CoverSource, FetchService, MetadataProvider, ProviderError, ResolvedMedia, StreamDescriptor,
    TaggingService, TranscodeService,
};
use tunecache_services::{
    AcquisitionConfig, AcquisitionPipeline, ConsumptionService, GarbageCollector, KeyedLock,
    LocalStorage, Providers, Storage,
};

pub const COVER_BYTES: &[u8] = &[0xff, 0xd8, 0xff, 0xe0];

pub fn resolved(content_id: &str, title: &str) -> ResolvedMedia {
    ResolvedMedia {
        content_id: content_id.to_string(),
        title: title.to_string(),
        author: "Some Channel".to_string(),
        thumbnail_url: format!("https://img.example/{}.jpg", content_id),
        duration_seconds: 213,
        track: None,
        streams: vec![
            StreamDescriptor {
                format_id: "18".to_string(),
                url: format!("https://cdn.example/{}/18", content_id),
                container: "mp4".to_string(),
                audio_only: false,
                size_bytes: Some(9_000_000),
            },
            StreamDescriptor {
                format_id: "140".to_string(),
                url: format!("https://cdn.example/{}/140", content_id),
                container: "m4a".to_string(),
                audio_only: true,
                size_bytes: Some(3_400_000),
            },
        ],
    }
}

#[derive(Default)]
pub struct StubMetadata {
    items: Mutex<HashMap<String, ResolvedMedia>>,
    collections: Mutex<HashMap<String, Vec<String>>>,
}

impl StubMetadata {
    pub fn add(&self, media: ResolvedMedia) {
        self.items
            .lock()
            .unwrap()
            .insert(media.content_id.clone(), media);
    }

    pub fn add_collection(&self, collection_id: &str, items: &[&str]) {
        self.collections.lock().unwrap().insert(
            collection_id.to_string(),
            items.iter().map(|s| s.to_string()).collect(),
        );
    }
}

#[async_trait]
impl MetadataProvider for StubMetadata {
    async fn resolve(&self, content_id: &str) -> Result<ResolvedMedia, ProviderError> {
        self.items
            .lock()
            .unwrap()
            .get(content_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(content_id.to_string()))
    }

    async fn expand_collection(&self, collection_id: &str) -> Result<Vec<String>, ProviderError> {
        self.collections
            .lock()
            .unwrap()
            .get(collection_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(collection_id.to_string()))
    }
}

#[derive(Default)]
pub struct StubFetcher {
    pub downloads: AtomicUsize,
    pub delay: Option<Duration>,
}

#[async_trait]
impl FetchService for StubFetcher {
    async fn download(&self, stream: &StreamDescriptor, dest: &Path) -> Result<PathBuf, ProviderError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        tokio::fs::write(dest, stream.url.as_bytes()).await?;
        Ok(dest.to_path_buf())
    }
}

#[derive(Default)]
pub struct StubTranscoder {
    pub fail: bool,
}

#[async_trait]
impl TranscodeService for StubTranscoder {
    async fn convert(&self, input: &Path) -> Result<PathBuf, ProviderError> {
        if self.fail {
            return Err(ProviderError::Conversion("invalid data found when processing input".to_string()));
        }
        let output = input.with_extension("mp3");
        let data = tokio::fs::read(input).await?;
        tokio::fs::write(&output, data).await?;
        tokio::fs::remove_file(input).await?;
        Ok(output)
    }
}

#[derive(Default)]
pub struct StubTagger {
    pub tagged: Mutex<Vec<(PathBuf, TagSet, Option<Vec<u8>>)>>,
}

#[async_trait]
impl TaggingService for StubTagger {
    async fn tag(&self, path: &Path, tags: &TagSet, cover: Option<&[u8]>) -> Result<(), ProviderError> {
        if !path.exists() {
            return Err(ProviderError::Tag(format!("{} does not exist", path.display())));
        }
        self.tagged
            .lock()
            .unwrap()
            .push((path.to_path_buf(), tags.clone(), cover.map(<[u8]>::to_vec)));
        Ok(())
    }
}

#[derive(Default)]
pub struct StubCovers {
    pub fail: bool,
}

#[async_trait]
impl CoverSource for StubCovers {
    async fn fetch(&self, thumbnail_url: &str) -> Result<Vec<u8>, ProviderError> {
        if self.fail {
            return Err(ProviderError::Network(format!("GET {} returned 404", thumbnail_url)));
        }
        Ok(COVER_BYTES.to_vec())
    }
}

pub struct Stubs {
    pub metadata: Arc<StubMetadata>,
    pub fetcher: Arc<StubFetcher>,
    pub transcoder: Arc<StubTranscoder>,
    pub tagger: Arc<StubTagger>,
    pub custom_tagger: Option<Arc<dyn TaggingService>>,
    pub covers: Arc<StubCovers>,
}

impl Default for Stubs {
    fn default() -> Self {
        Self {
            metadata: Arc::new(StubMetadata::default()),
            fetcher: Arc::new(StubFetcher::default()),
            transcoder: Arc::new(StubTranscoder::default()),
            tagger: Arc::new(StubTagger::default()),
            custom_tagger: None,
            covers: Arc::new(StubCovers::default()),
        }
    }
}

impl Stubs {
    fn providers(&self) -> Providers {
        Providers {
            metadata: self.metadata.clone(),
            fetcher: self.fetcher.clone(),
            transcoder: self.transcoder.clone(),
            tagger: self
                .custom_tagger
                .clone()
                .unwrap_or_else(|| self.tagger.clone() as Arc<dyn TaggingService>),
            covers: self.covers.clone(),
        }
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub media_dir: PathBuf,
    pub storage: Arc<dyn Storage>,
    pub locks: Arc<KeyedLock>,
    pub pipeline: AcquisitionPipeline,
    pub collector: GarbageCollector,
    pub consumption: ConsumptionService,
    pub media: MediaRepository,
    pub associations: AssociationRepository,
    _dir: TempDir,
}

impl Harness {
    pub async fn new(stubs: &Stubs) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("cache.db").display());
        let pool = create_pool(DatabaseConfig::new(url)).await.unwrap();

        let media_dir = dir.path().join("songs");
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(&media_dir).await.unwrap());
        let locks = Arc::new(KeyedLock::new());

        let pipeline = AcquisitionPipeline::new(
            pool.clone(),
            storage.clone(),
            stubs.providers(),
            locks.clone(),
            AcquisitionConfig::default(),
        );
        let media = MediaRepository::new(pool.clone());
        let associations = AssociationRepository::new(pool.clone());
        let collector = GarbageCollector::new(
            associations.clone(),
            media.clone(),
            storage.clone(),
            locks.clone(),
        );
        let consumption = ConsumptionService::new(associations.clone(), storage.clone());

        Self {
            pool,
            media_dir,
            storage,
            locks,
            pipeline,
            collector,
            consumption,
            media,
            associations,
            _dir: dir,
        }
    }

    pub async fn association_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM associations")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.media_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn track(song: &str, artist: &str) -> TrackInfo {
    TrackInfo {
        song: Some(song.to_string()),
        artist: Some(artist.to_string()),
        album: None,
    }
}
