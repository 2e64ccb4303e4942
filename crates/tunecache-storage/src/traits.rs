//! The media directory seen as a keyed file store.
//!
//! Downloader, transcoder and tagger all work on paths, so a key resolves to a
//! path rather than to a byte stream.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no stored file named {0:?}")]
    NotFound(String),

    #[error("rejected storage key: {0}")]
    InvalidKey(String),

    #[error("could not remove stored file: {0}")]
    Remove(String),

    #[error("media directory unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Where the file for `key` lives, whether or not it exists yet.
    fn path_for(&self, key: &str) -> StorageResult<PathBuf>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Remove the file for `key`. Fails with [`StorageError::NotFound`] if there is none.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}
