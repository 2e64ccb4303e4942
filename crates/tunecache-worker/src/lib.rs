//! Tunecache Worker – background task queue and worker infrastructure.
//!
//! This crate provides the task queue (polling, retry, worker pool), the periodic
//! garbage-collection scheduler and the `TaskHandlerContext` trait. The services
//! crate implements the trait and runs the actual jobs.

mod context;
mod queue;
mod scheduler;

pub use context::TaskHandlerContext;
pub use queue::{TaskQueue, TaskQueueConfig, MAX_RETRY_BACKOFF_SECS};
pub use scheduler::GcScheduler;
