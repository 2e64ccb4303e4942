use std::time::Duration;

use tokio::time::interval;
use tunecache_core::models::{Job, TaskType};

use crate::queue::TaskQueue;

/// Submits a garbage-collection job every period.
///
/// A tick is skipped while a previous collection is still queued or running, so
/// a stalled worker pool does not accumulate a backlog of identical jobs.
#[derive(Clone)]
pub struct GcScheduler {
    queue: TaskQueue,
    period: Duration,
}

impl GcScheduler {
    pub fn new(queue: TaskQueue, period: Duration) -> Self {
        Self { queue, period }
    }

    /// Submit one collection now unless one is already pending. Returns whether a
    /// job was submitted.
    pub async fn tick(&self) -> anyhow::Result<bool> {
        if self
            .queue
            .repository()
            .has_unfinished(TaskType::GarbageCollection)
            .await?
        {
            tracing::debug!("Garbage collection already queued, skipping tick");
            return Ok(false);
        }
        self.queue.submit(&Job::GarbageCollection).await?;
        Ok(true)
    }

    /// Start the background loop. Abort the returned handle to stop it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(period_secs = self.period.as_secs(), "Garbage collection scheduler started");
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(e) = self.tick().await {
                    tracing::error!(error = %e, "Failed to schedule garbage collection");
                }
            }
        })
    }
}
