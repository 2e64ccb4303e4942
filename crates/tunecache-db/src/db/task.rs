use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use tunecache_core::models::timestamp::to_millis;
use tunecache_core::models::{Task, TaskStatus, TaskType};

const TASK_COLUMNS: &str = "id, task_type, status, priority, payload, result, scheduled_at, \
     started_at, completed_at, retry_count, max_retries, timeout_seconds, created_at, updated_at";

/// Timeout assumed by the reaper for tasks created without one.
const DEFAULT_TIMEOUT_SECS: i64 = 3600;

#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new task
    #[tracing::instrument(skip(self, payload))]
    pub async fn create_task(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        priority: i32,
        scheduled_at: Option<DateTime<Utc>>,
        max_retries: Option<i32>,
        timeout_seconds: Option<i32>,
    ) -> Result<Task> {
        let now = Utc::now();
        let scheduled_at = scheduled_at.unwrap_or(now);
        let status = if scheduled_at > now {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Pending
        };

        let sql = format!(
            r#"
            INSERT INTO tasks (
                id, task_type, status, priority, payload, scheduled_at,
                max_retries, timeout_seconds, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            TASK_COLUMNS
        );

        let task = sqlx::query_as::<_, Task>(&sql)
            .bind(Uuid::new_v4())
            .bind(task_type.to_string())
            .bind(status.to_string())
            .bind(priority)
            .bind(payload.to_string())
            .bind(to_millis(scheduled_at))
            .bind(max_retries.unwrap_or(3))
            .bind(timeout_seconds)
            .bind(to_millis(now))
            .bind(to_millis(now))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, task_type = %task_type, "Failed to insert task");
                anyhow::anyhow!("Failed to insert task into database: {}", e)
            })?;

        tracing::debug!(
            task_id = %task.id,
            task_type = %task_type,
            priority = priority,
            "Task created"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
        sqlx::query_as::<_, Task>(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch task")
    }

    /// Atomically claim the next runnable task and mark it running.
    ///
    /// Selection and update are one statement, so two workers (or two processes
    /// sharing the database file) never claim the same row.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next_task(&self) -> Result<Option<Task>> {
        let now = to_millis(Utc::now());
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'running',
                started_at = ?,
                updated_at = ?
            WHERE id = (
                SELECT id FROM tasks
                WHERE status IN ('pending', 'scheduled')
                  AND scheduled_at <= ?
                ORDER BY priority DESC, scheduled_at ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            TASK_COLUMNS
        );

        let task = sqlx::query_as::<_, Task>(&sql)
            .bind(now)
            .bind(now)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to claim next task")?;

        if let Some(ref task) = task {
            tracing::debug!(task_id = %task.id, task_type = %task.task_type, "Task claimed");
        }

        Ok(task)
    }

    #[tracing::instrument(skip(self, result))]
    pub async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        self.finish(task_id, TaskStatus::Completed, result)
            .await
            .context("Failed to mark task as completed")
    }

    #[tracing::instrument(skip(self, error))]
    pub async fn mark_failed(&self, task_id: Uuid, error: serde_json::Value) -> Result<Task> {
        let task = self
            .finish(task_id, TaskStatus::Failed, error)
            .await
            .context("Failed to mark task as failed")?;

        tracing::warn!(
            task_id = %task_id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            "Task failed"
        );

        Ok(task)
    }

    async fn finish(&self, task_id: Uuid, status: TaskStatus, result: serde_json::Value) -> Result<Task> {
        let now = to_millis(Utc::now());
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = ?,
                result = ?,
                completed_at = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        let task = sqlx::query_as::<_, Task>(&sql)
            .bind(status.to_string())
            .bind(result.to_string())
            .bind(now)
            .bind(now)
            .bind(task_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(task)
    }

    /// Count one more attempt and put the task back in the queue at `run_at`.
    #[tracing::instrument(skip(self))]
    pub async fn reschedule(&self, task_id: Uuid, run_at: DateTime<Utc>) -> Result<Task> {
        let now = Utc::now();
        let status = if run_at > now {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Pending
        };
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = ?,
                retry_count = retry_count + 1,
                scheduled_at = ?,
                started_at = NULL,
                updated_at = ?
            WHERE id = ?
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        let task = sqlx::query_as::<_, Task>(&sql)
            .bind(status.to_string())
            .bind(to_millis(run_at))
            .bind(to_millis(now))
            .bind(task_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to reschedule task")?;

        tracing::info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            "Task retry scheduled"
        );

        Ok(task)
    }

    /// Re-queue tasks left `running` past their timeout plus `grace_period_secs`,
    /// which happens when a worker dies mid-task. Tasks out of retries are failed.
    /// Returns the number of tasks touched.
    #[tracing::instrument(skip(self))]
    pub async fn reap_stale_running_tasks(&self, grace_period_secs: i64) -> Result<u64> {
        let now = to_millis(Utc::now());
        let grace_ms = grace_period_secs.max(0) * 1000;

        let failed = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed',
                result = '{"error":"Task abandoned by its worker","reason":"stale"}',
                completed_at = ?,
                updated_at = ?
            WHERE status = 'running'
              AND started_at + (COALESCE(timeout_seconds, ?) * 1000) + ? < ?
              AND retry_count >= max_retries
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(DEFAULT_TIMEOUT_SECS)
        .bind(grace_ms)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to fail stale tasks")?
        .rows_affected();

        let requeued = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending',
                retry_count = retry_count + 1,
                started_at = NULL,
                scheduled_at = ?,
                updated_at = ?
            WHERE status = 'running'
              AND started_at + (COALESCE(timeout_seconds, ?) * 1000) + ? < ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(DEFAULT_TIMEOUT_SECS)
        .bind(grace_ms)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to requeue stale tasks")?
        .rows_affected();

        if failed + requeued > 0 {
            tracing::warn!(
                requeued = requeued,
                failed = failed,
                "Reaped stale running tasks"
            );
        }

        Ok(failed + requeued)
    }

    /// Delete completed and failed tasks whose completion is older than
    /// `older_than_days`. Returns the number of rows deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_old_finished_tasks(&self, older_than_days: i32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
        let result = sqlx::query(
            r#"
            DELETE FROM tasks
            WHERE status IN ('completed', 'failed')
              AND COALESCE(completed_at, updated_at) < ?
            "#,
        )
        .bind(to_millis(cutoff))
        .execute(&self.pool)
        .await
        .context("Failed to delete old finished tasks")?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::info!(
                count = count,
                older_than_days = older_than_days,
                "Deleted old finished tasks"
            );
        }
        Ok(count)
    }

    /// Whether a task of this type is waiting or running.
    pub async fn has_unfinished(&self, task_type: TaskType) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM tasks
            WHERE task_type = ? AND status IN ('pending', 'scheduled', 'running')
            LIMIT 1
            "#,
        )
        .bind(task_type.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to check unfinished tasks")?;
        Ok(found.is_some())
    }

    pub async fn count_by_status(&self, status: TaskStatus) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count tasks")
    }
}
