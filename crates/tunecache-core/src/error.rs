//! Errors returned to a session: submitting a request, listing its media and
//! consuming files. Acquisition failures never surface here; a session only sees
//! that the media did not appear.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

use crate::content_url::InvalidUrlError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("cache store: {0}")]
    Database(#[source] SqlxError),

    #[error(transparent)]
    InvalidUrl(#[from] InvalidUrlError),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("media directory: {0}")]
    Storage(String),

    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::RowNotFound => AppError::NotFound("row".to_string()),
            other => AppError::Database(other),
        }
    }
}

/// Repositories return `anyhow::Error` with context; a wrapped sqlx error keeps
/// its own variant.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        #[cfg(feature = "sqlx")]
        let err = match err.downcast::<SqlxError>() {
            Ok(sqlx_err) => return AppError::from(sqlx_err),
            Err(err) => err,
        };
        AppError::Internal {
            message: format!("{:#}", err),
            source: err,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}
