//! HTTP stream fetcher and cover art source.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::{CoverSource, FetchService, ProviderError, StreamDescriptor};

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// Streams a descriptor's URL to disk, retrying a bounded number of times.
pub struct HttpFetcher {
    http_client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(max_retries: u32) -> Result<Self, ProviderError> {
        // Long tracks over slow links; the worker's task timeout is the real bound.
        Ok(Self {
            http_client: build_client(Duration::from_secs(30 * 60))?,
            max_retries,
        })
    }

    async fn download_once(&self, url: &str, dest: &Path) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Network(format!("GET {} returned {}", url, status)));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Network(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl FetchService for HttpFetcher {
    #[tracing::instrument(skip(self, stream), fields(format_id = %stream.format_id, dest = %dest.display()))]
    async fn download(&self, stream: &StreamDescriptor, dest: &Path) -> Result<PathBuf, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.download_once(&stream.url, dest).await {
                Ok(()) => return Ok(dest.to_path_buf()),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "Stream download failed, retrying");
                    let _ = tokio::fs::remove_file(dest).await;
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(e);
                }
            }
        }
    }
}

/// Fetches thumbnail images for embedding as cover art.
pub struct HttpCoverSource {
    http_client: Client,
}

impl HttpCoverSource {
    pub fn new() -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: build_client(Duration::from_secs(30))?,
        })
    }
}

#[async_trait]
impl CoverSource for HttpCoverSource {
    async fn fetch(&self, thumbnail_url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .http_client
            .get(thumbnail_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
