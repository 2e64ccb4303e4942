//! Tunecache Core Library
//!
//! This crate provides the domain models, error types, configuration and small
//! pure helpers (URL normalization, display formatting) shared by every tunecache
//! component.

pub mod config;
pub mod constants;
pub mod content_url;
pub mod error;
pub mod format;
pub mod models;
pub mod task_error;

// Re-export commonly used types
pub use config::{BaseConfig, Config, TuneCacheConfig};
pub use content_url::{parse_content_url, ContentRef, InvalidUrlError};
pub use error::AppError;
pub use task_error::{TaskError, TaskResultExt};
