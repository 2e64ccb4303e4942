//! File storage for converted media.
//!
//! Keys are bare file names inside one media directory. A key containing `..`,
//! `/` or `\` is rejected before it reaches the filesystem.

pub mod local;
pub mod traits;

pub use local::LocalStorage;
pub use traits::{Storage, StorageError, StorageResult};
