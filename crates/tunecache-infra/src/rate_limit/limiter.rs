use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use tunecache_core::models::TaskType;

/// Token bucket holding at most one token, refilled every `interval`.
///
/// With a single-token burst the n-th start is never earlier than
/// `first + (n - 1) * interval`, so a limit of N per minute admits at most N starts
/// in any sixty-second window.
#[derive(Debug, Clone)]
struct TokenBucket {
    interval: Duration,
    next_free: Instant,
}

impl TokenBucket {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_free: Instant::now(),
        }
    }

    /// Reserve the next slot and return when it starts.
    fn reserve(&mut self) -> Instant {
        let slot = self.next_free.max(Instant::now());
        self.next_free = slot + self.interval;
        slot
    }
}

/// Process-wide limiter of task starts. Only acquisitions are limited; other
/// task types pass straight through.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<TaskType, TokenBucket>>>,
    acquisition_interval: Duration,
}

impl RateLimiter {
    /// Limit acquisitions to `acquisitions_per_minute` starts (values below 1 are
    /// treated as 1).
    pub fn new(acquisitions_per_minute: u32) -> Self {
        let per_minute = acquisitions_per_minute.max(1);
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            acquisition_interval: Duration::from_secs(60) / per_minute,
        }
    }

    fn interval_for(&self, task_type: TaskType) -> Option<Duration> {
        match task_type {
            TaskType::Acquisition => Some(self.acquisition_interval),
            TaskType::GarbageCollection => None,
        }
    }

    /// Acquire a token for the given task type, waiting until one is available.
    ///
    /// The slot is reserved under the lock and waited for outside it, so waiters
    /// are served in arrival order.
    #[tracing::instrument(skip(self))]
    pub async fn acquire(&self, task_type: TaskType) {
        let Some(interval) = self.interval_for(task_type) else {
            return;
        };

        let slot = {
            let mut buckets = self.buckets.lock().await;
            buckets
                .entry(task_type)
                .or_insert_with(|| TokenBucket::new(interval))
                .reserve()
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(
                task_type = %task_type,
                wait_ms = wait.as_millis(),
                "Rate limit reached, waiting for token"
            );
            tokio::time::sleep_until(slot).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sequential_starts_capped_per_minute() {
        let limiter = RateLimiter::new(100);
        let start = Instant::now();

        let mut within_window = 0;
        for _ in 0..150 {
            limiter.acquire(TaskType::Acquisition).await;
            if start.elapsed() < Duration::from_secs(60) {
                within_window += 1;
            }
        }

        assert_eq!(within_window, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_starts_share_one_budget() {
        let limiter = RateLimiter::new(100);
        let start = Instant::now();

        let handles: Vec<_> = (0..150)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire(TaskType::Acquisition).await;
                    start.elapsed()
                })
            })
            .collect();

        let mut elapsed = Vec::new();
        for handle in handles {
            elapsed.push(handle.await.unwrap());
        }

        let within = elapsed
            .iter()
            .filter(|e| **e < Duration::from_secs(60))
            .count();
        assert!(within <= 100, "{} starts inside the first minute", within);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_collection_is_not_limited() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire(TaskType::GarbageCollection).await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
