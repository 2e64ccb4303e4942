use async_trait::async_trait;
use std::sync::Arc;

use tunecache_core::models::{Job, Task};
use tunecache_core::{TaskError, TaskResultExt};
use tunecache_worker::TaskHandlerContext;

use crate::acquisition::AcquisitionPipeline;
use crate::gc::GarbageCollector;

/// Dispatches claimed tasks to the acquisition pipeline or the collector.
pub struct AppContext {
    pub pipeline: AcquisitionPipeline,
    pub collector: GarbageCollector,
}

#[async_trait]
impl TaskHandlerContext for AppContext {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> anyhow::Result<serde_json::Value> {
        let job = task.job().unrecoverable()?;

        match job {
            Job::Acquisition(payload) => {
                let outcome = self
                    .pipeline
                    .run(&payload.content_id, &payload.session_token)
                    .await
                    .map_err(|e| {
                        if e.is_recoverable() {
                            TaskError::recoverable(e)
                        } else {
                            TaskError::unrecoverable(e)
                        }
                    })?;
                Ok(serde_json::to_value(outcome)?)
            }
            Job::GarbageCollection => {
                let report = self.collector.run_cycle().await.map_err(TaskError::recoverable)?;
                Ok(serde_json::to_value(report)?)
            }
        }
    }
}
