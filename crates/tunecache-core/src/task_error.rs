//! Failure classification for queued jobs.
//!
//! A job that fails because the store was briefly unavailable is worth running
//! again. One whose identifier does not resolve, or whose download ffmpeg rejects,
//! will fail the same way on every attempt.

use std::fmt;

#[derive(Debug)]
pub enum TaskError {
    /// Redelivered while the task has retries left.
    Recoverable(anyhow::Error),
    /// Fails the task on the spot.
    Final(anyhow::Error),
}

impl TaskError {
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        TaskError::Final(err.into())
    }

    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        TaskError::Recoverable(err.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, TaskError::Recoverable(_))
    }

    pub fn cause(&self) -> &anyhow::Error {
        match self {
            TaskError::Recoverable(e) | TaskError::Final(e) => e,
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.cause())
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause().source()
    }
}

/// Errors without a classification get the benefit of the doubt.
impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Recoverable(err)
    }
}

pub trait TaskResultExt<T> {
    /// Mark the error, if any, as final.
    fn unrecoverable(self) -> Result<T, TaskError>;
}

impl<T, E: Into<anyhow::Error>> TaskResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, TaskError> {
        self.map_err(TaskError::unrecoverable)
    }
}
