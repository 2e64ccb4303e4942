//! Data models for the application
//!
//! Media items, client sessions, the associations between them, and the
//! persisted task queue entries.

mod association;
mod client;
mod media;
mod tags;
mod task;
pub mod timestamp;

pub use association::*;
pub use client::*;
pub use media::*;
pub use tags::*;
pub use task::*;
