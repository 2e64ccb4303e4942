//! Persisted job queue and the worker pool that drains it.
//!
//! Any number of processes may submit; the process that constructs the queue with
//! [`TaskQueue::new`] also runs workers. [`TaskQueue::shutdown`] stops claiming but
//! does not wait for jobs in flight. A job still `running` when its process exits
//! is handed back to the queue by the reaper once its timeout and grace expire.

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use tunecache_core::models::{Job, Task, TaskType};
use tunecache_core::TaskError;
use tunecache_db::TaskRepository;
use tunecache_infra::RateLimiter;

use crate::context::TaskHandlerContext;

/// Upper bound on the delay before a recoverable failure is redelivered.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Timeout applied to tasks persisted without one.
const FALLBACK_TIMEOUT_SECS: u64 = 3600;

/// Delay before redelivery number `retry_count + 1`: 1s, 2s, 4s, ... capped.
pub(crate) fn retry_backoff(retry_count: i32) -> Duration {
    let secs = 1_u64
        .checked_shl(retry_count.max(0) as u32)
        .unwrap_or(u64::MAX)
        .min(MAX_RETRY_BACKOFF_SECS);
    Duration::from_secs(secs)
}

#[derive(Clone, Debug)]
pub struct TaskQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub default_timeout_seconds: i32,
    pub max_retries: i32,
    /// Seconds between reaper passes; 0 disables the reaper.
    pub stale_task_reap_interval_secs: u64,
    /// Added to a task's timeout before a `running` task counts as abandoned.
    pub stale_task_grace_period_secs: i64,
    /// Finished tasks older than this many days are pruned; 0 keeps them.
    pub task_retention_days: i32,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 500,
            default_timeout_seconds: 3600,
            max_retries: 3,
            stale_task_reap_interval_secs: 60,
            stale_task_grace_period_secs: 300,
            task_retention_days: 7,
        }
    }
}

/// What to do with a task after one execution attempt.
#[derive(Debug, PartialEq)]
enum Disposition {
    Complete(Value),
    Retry,
    Fail(Value),
}

/// Map an attempt's result to the task's next state. `None` means the attempt
/// timed out. A timed-out acquisition is not retried: its download already got
/// the fetcher's own retries.
fn disposition(task: &Task, attempt: Option<Result<Value>>) -> Disposition {
    match attempt {
        Some(Ok(value)) => Disposition::Complete(value),
        Some(Err(e)) => {
            let unrecoverable = e
                .downcast_ref::<TaskError>()
                .is_some_and(|te| !te.is_recoverable());
            if unrecoverable {
                Disposition::Fail(json!({
                    "error": format!("{:#}", e),
                    "retry_count": task.retry_count,
                    "unrecoverable": true,
                }))
            } else if task.can_retry() {
                Disposition::Retry
            } else {
                Disposition::Fail(json!({
                    "error": format!("{:#}", e),
                    "retry_count": task.retry_count,
                    "reason": "retries exhausted",
                }))
            }
        }
        None if task.task_type != TaskType::Acquisition && task.can_retry() => Disposition::Retry,
        None => Disposition::Fail(json!({
            "error": "timed out",
            "timeout_seconds": task.timeout_seconds,
        })),
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    repository: TaskRepository,
    config: TaskQueueConfig,
    shutdown: Arc<watch::Sender<bool>>,
}

impl TaskQueue {
    /// Build the queue and start its worker pool. Jobs are dispatched through
    /// `context`; once it is dropped, claimed jobs fail and are redelivered.
    pub fn new(
        repository: TaskRepository,
        rate_limiter: RateLimiter,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
    ) -> Self {
        let (shutdown, stop) = watch::channel(false);

        let pool = WorkerPool {
            repository: repository.clone(),
            rate_limiter,
            context,
            permits: Arc::new(Semaphore::new(config.max_workers)),
        };
        if config.stale_task_reap_interval_secs > 0 {
            tokio::spawn(reap_loop(repository.clone(), config.clone(), stop.clone()));
        }
        tokio::spawn(pool.run(Duration::from_millis(config.poll_interval_ms), stop));

        Self {
            repository,
            config,
            shutdown: Arc::new(shutdown),
        }
    }

    /// A queue that only writes. Another process runs the workers.
    pub fn new_no_worker(repository: TaskRepository, config: TaskQueueConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            repository,
            config,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Persist `job` for execution and return the task id.
    #[tracing::instrument(skip(self, job), fields(task.type = %job.task_type()))]
    pub async fn submit(&self, job: &Job) -> Result<Uuid> {
        let priority = job.priority();
        let payload = job.to_payload().context("Failed to serialize job payload")?;

        let task = self
            .repository
            .create_task(
                job.task_type(),
                payload,
                priority.as_i32(),
                None,
                Some(self.config.max_retries),
                Some(self.config.default_timeout_seconds),
            )
            .await
            .context("Failed to enqueue job")?;

        tracing::info!(task_id = %task.id, priority = priority.as_i32(), "Job queued");
        Ok(task.id)
    }

    pub fn repository(&self) -> &TaskRepository {
        &self.repository
    }

    pub async fn shutdown(&self) {
        tracing::info!("Stopping task queue");
        self.shutdown.send_replace(true);
    }
}

struct WorkerPool {
    repository: TaskRepository,
    rate_limiter: RateLimiter,
    context: Weak<dyn TaskHandlerContext>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    async fn run(self, poll_interval: Duration, mut stop: watch::Receiver<bool>) {
        tracing::info!(
            max_workers = self.permits.available_permits(),
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Worker pool started"
        );

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.claim_one().await,
            }
        }

        tracing::info!("Worker pool stopped");
    }

    /// Claim at most one task if a worker slot is free.
    async fn claim_one(&self) {
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            tracing::trace!("All workers busy");
            return;
        };

        match self.repository.claim_next_task().await {
            Ok(Some(task)) => {
                let worker = Worker {
                    repository: self.repository.clone(),
                    rate_limiter: self.rate_limiter.clone(),
                    context: self.context.clone(),
                };
                tokio::spawn(worker.execute(task, permit));
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Failed to claim task"),
        }
    }
}

struct Worker {
    repository: TaskRepository,
    rate_limiter: RateLimiter,
    context: Weak<dyn TaskHandlerContext>,
}

impl Worker {
    #[tracing::instrument(skip_all, fields(task_id = %task.id, task_type = %task.task_type))]
    async fn execute(self, task: Task, _permit: OwnedSemaphorePermit) {
        self.rate_limiter.acquire(task.task_type).await;

        let attempt = match self.context.upgrade() {
            Some(context) => {
                let timeout = task
                    .timeout_seconds
                    .map(|s| Duration::from_secs(s.max(1) as u64))
                    .unwrap_or(Duration::from_secs(FALLBACK_TIMEOUT_SECS));
                tokio::time::timeout(timeout, context.dispatch_task(&task))
                    .await
                    .ok()
            }
            None => Some(Err(anyhow::anyhow!("task handler context is gone"))),
        };

        if let Some(Err(e)) = &attempt {
            tracing::warn!(error = %e, retry_count = task.retry_count, "Task attempt failed");
        } else if attempt.is_none() {
            tracing::warn!(timeout_seconds = ?task.timeout_seconds, "Task attempt timed out");
        }

        if let Err(e) = self.settle(&task, disposition(&task, attempt)).await {
            tracing::error!(error = %e, "Failed to record task outcome");
        }
    }

    async fn settle(&self, task: &Task, disposition: Disposition) -> Result<()> {
        match disposition {
            Disposition::Complete(value) => {
                self.repository.mark_completed(task.id, value).await?;
                tracing::info!("Task completed");
            }
            Disposition::Retry => {
                let delay = retry_backoff(task.retry_count);
                let run_at = Utc::now() + TimeDelta::seconds(delay.as_secs() as i64);
                self.repository.reschedule(task.id, run_at).await?;
                tracing::info!(delay_secs = delay.as_secs(), attempt = task.retry_count + 1, "Task rescheduled");
            }
            Disposition::Fail(value) => {
                self.repository.mark_failed(task.id, value).await?;
                tracing::error!("Task failed");
            }
        }
        Ok(())
    }
}

/// Requeue abandoned `running` tasks and prune old finished ones until stopped.
async fn reap_loop(repository: TaskRepository, config: TaskQueueConfig, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.stale_task_reap_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = repository
                    .reap_stale_running_tasks(config.stale_task_grace_period_secs)
                    .await
                {
                    tracing::error!(error = %e, "Stale task reaping failed");
                }
                if config.task_retention_days > 0 {
                    if let Err(e) = repository
                        .delete_old_finished_tasks(config.task_retention_days)
                        .await
                    {
                        tracing::error!(error = %e, "Finished task pruning failed");
                    }
                }
            }
        }
    }
}
