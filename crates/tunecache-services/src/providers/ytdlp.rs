//! Metadata provider backed by the `yt-dlp` executable.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;

use tunecache_core::models::TrackInfo;
use tunecache_core::ContentRef;

use super::{MetadataProvider, ProviderError, ResolvedMedia, StreamDescriptor};

pub struct YtDlpProvider {
    ytdlp_path: String,
}

impl YtDlpProvider {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
        }
    }

    async fn dump_json(&self, url: &str, flat: bool) -> Result<Vec<u8>, ProviderError> {
        let mut cmd = Command::new(&self.ytdlp_path);
        cmd.arg("--dump-single-json")
            .arg("--no-warnings")
            .arg("--skip-download");
        if flat {
            cmd.arg("--flat-playlist");
        }
        let output = cmd
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // yt-dlp reports removed, private and malformed ids the same way.
            return Err(ProviderError::NotFound(format!(
                "{}: {}",
                url,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    url: Option<String>,
    ext: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    filesize: Option<i64>,
    filesize_approx: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct YtDlpVideo {
    id: String,
    title: String,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    track: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    #[serde(default)]
    entries: Vec<Option<YtDlpEntry>>,
}

fn is_none_codec(codec: &Option<String>) -> bool {
    matches!(codec.as_deref(), Some("none"))
}

impl From<YtDlpFormat> for Option<StreamDescriptor> {
    fn from(format: YtDlpFormat) -> Self {
        let url = format.url?;
        let audio_only = is_none_codec(&format.vcodec) && !is_none_codec(&format.acodec);
        Some(StreamDescriptor {
            format_id: format.format_id,
            url,
            container: format.ext.unwrap_or_default(),
            audio_only,
            size_bytes: format.filesize.or(format.filesize_approx),
        })
    }
}

fn to_resolved(video: YtDlpVideo) -> ResolvedMedia {
    let track = if video.track.is_some() || video.artist.is_some() || video.album.is_some() {
        Some(TrackInfo {
            song: video.track,
            artist: video.artist,
            album: video.album,
        })
    } else {
        None
    };

    ResolvedMedia {
        content_id: video.id,
        title: video.title,
        author: video.channel.or(video.uploader).unwrap_or_default(),
        thumbnail_url: video.thumbnail.unwrap_or_default(),
        duration_seconds: video.duration.map(|d| d.round() as i64).unwrap_or(0),
        track,
        streams: video
            .formats
            .into_iter()
            .filter_map(Option::<StreamDescriptor>::from)
            .collect(),
    }
}

#[async_trait]
impl MetadataProvider for YtDlpProvider {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, content_id: &str) -> Result<ResolvedMedia, ProviderError> {
        let stdout = self
            .dump_json(&ContentRef::watch_url(content_id), false)
            .await?;
        let video: YtDlpVideo = serde_json::from_slice(&stdout)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(to_resolved(video))
    }

    #[tracing::instrument(skip(self))]
    async fn expand_collection(&self, collection_id: &str) -> Result<Vec<String>, ProviderError> {
        let reference = ContentRef {
            content_id: collection_id.to_string(),
            is_collection: true,
        };
        let stdout = self.dump_json(&reference.canonical_url(), true).await?;
        let playlist: YtDlpPlaylist = serde_json::from_slice(&stdout)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(playlist
            .entries
            .into_iter()
            .flatten()
            .filter_map(|e| e.id)
            .collect())
    }
}
