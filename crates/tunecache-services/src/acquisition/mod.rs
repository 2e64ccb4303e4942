//! Acquisition of one content item into the shared cache.

mod error;
mod keyed_lock;
mod pipeline;

pub use error::AcquisitionError;
pub use keyed_lock::KeyedLock;
pub use pipeline::{AcquisitionConfig, AcquisitionOutcome, AcquisitionPipeline, Providers};

/// Lock key serializing work on one dedup title.
pub(crate) fn title_key(title: &str) -> String {
    format!("title:{}", title)
}

/// Lock key serializing writes and deletes of one stored file.
pub(crate) fn file_key(file_name: &str) -> String {
    format!("file:{}", file_name)
}
