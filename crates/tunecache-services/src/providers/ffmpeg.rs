//! Transcoder backed by the `ffmpeg` executable.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use tunecache_core::constants::OUTPUT_EXTENSION;

use super::{ProviderError, TranscodeService};

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

#[async_trait]
impl TranscodeService for FfmpegTranscoder {
    #[tracing::instrument(skip(self), fields(input = %input.display()))]
    async fn convert(&self, input: &Path) -> Result<PathBuf, ProviderError> {
        let output_path = input.with_extension(OUTPUT_EXTENSION);
        if output_path == input {
            return Err(ProviderError::Conversion(format!(
                "input is already .{}",
                OUTPUT_EXTENSION
            )));
        }

        let args = vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            "-q:a".to_string(),
            "2".to_string(),
            "-y".to_string(),
            output_path.to_string_lossy().to_string(),
        ];

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(ProviderError::Conversion(stderr.trim().to_string()));
        }

        if let Err(e) = tokio::fs::remove_file(input).await {
            tracing::warn!(error = %e, path = %input.display(), "Failed to remove transcoder input");
        }

        Ok(output_path)
    }
}
