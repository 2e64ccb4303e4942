use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use tunecache_core::models::Task;

/// Runs the job carried by a claimed task.
///
/// The queue only keeps a `Weak` handle; dropping the last `Arc` makes later
/// claims fail, and those tasks are redelivered once a context exists again.
/// Return an error wrapping [`tunecache_core::TaskError::Final`] to fail the task
/// without spending its retries.
#[async_trait]
pub trait TaskHandlerContext: Send + Sync {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<serde_json::Value>;
}
