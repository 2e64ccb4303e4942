//! External collaborators of the acquisition pipeline.
//!
//! The pipeline only sees these traits. Each has one concrete adapter behind a
//! cargo feature; tests substitute in-memory stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use tunecache_core::models::{TagSet, TrackInfo};

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "tagging")]
pub mod tagger;
#[cfg(feature = "ytdlp")]
pub mod ytdlp;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegTranscoder;
#[cfg(feature = "http")]
pub use http::{HttpCoverSource, HttpFetcher};
#[cfg(feature = "tagging")]
pub use tagger::LoftyTagger;
#[cfg(feature = "ytdlp")]
pub use ytdlp::YtDlpProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Tagging failed: {0}")]
    Tag(String),

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// One fetchable stream of a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub format_id: String,
    pub url: String,
    /// Container / file extension, e.g. `m4a`.
    pub container: String,
    pub audio_only: bool,
    pub size_bytes: Option<i64>,
}

/// Metadata and streams of a resolved content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub content_id: String,
    pub title: String,
    pub author: String,
    pub thumbnail_url: String,
    pub duration_seconds: i64,
    pub track: Option<TrackInfo>,
    pub streams: Vec<StreamDescriptor>,
}

impl ResolvedMedia {
    /// First audio-only stream in `container` (compared case-insensitively).
    pub fn select_stream(&self, container: &str) -> Option<&StreamDescriptor> {
        self.streams
            .iter()
            .find(|s| s.audio_only && s.container.eq_ignore_ascii_case(container))
    }
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn resolve(&self, content_id: &str) -> Result<ResolvedMedia, ProviderError>;

    /// Content ids of the items in a collection, in collection order.
    async fn expand_collection(&self, collection_id: &str) -> Result<Vec<String>, ProviderError>;
}

#[async_trait]
pub trait FetchService: Send + Sync {
    /// Download `stream` to `dest` and return the written path.
    async fn download(&self, stream: &StreamDescriptor, dest: &Path) -> Result<PathBuf, ProviderError>;
}

#[async_trait]
pub trait TranscodeService: Send + Sync {
    /// Convert `input` to the output format next to it, remove `input`, and
    /// return the output path.
    async fn convert(&self, input: &Path) -> Result<PathBuf, ProviderError>;
}

#[async_trait]
pub trait TaggingService: Send + Sync {
    async fn tag(&self, path: &Path, tags: &TagSet, cover: Option<&[u8]>) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait CoverSource: Send + Sync {
    async fn fetch(&self, thumbnail_url: &str) -> Result<Vec<u8>, ProviderError>;
}
