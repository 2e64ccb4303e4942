use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Stored as text; the string forms match the serde names.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => anyhow::bail!("unknown {} {:?}", stringify!($name), other),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Acquisition,
    GarbageCollection,
}

text_enum!(TaskType {
    Acquisition => "acquisition",
    GarbageCollection => "garbage_collection",
});

/// `Scheduled` is a pending task whose `scheduled_at` lies in the future.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

text_enum!(TaskStatus {
    Pending => "pending",
    Scheduled => "scheduled",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 3,
    #[default]
    Normal = 5,
    High = 7,
}

impl Priority {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

/// Payload of an acquisition job: one content identifier for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionPayload {
    pub content_id: String,
    pub session_token: String,
}

/// A unit of work, tagged by kind. This is what gets serialized into a task's
/// payload and what the worker dispatches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Acquisition(AcquisitionPayload),
    GarbageCollection,
}

impl Job {
    pub fn acquisition(content_id: impl Into<String>, session_token: impl Into<String>) -> Self {
        Job::Acquisition(AcquisitionPayload {
            content_id: content_id.into(),
            session_token: session_token.into(),
        })
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            Job::Acquisition(_) => TaskType::Acquisition,
            Job::GarbageCollection => TaskType::GarbageCollection,
        }
    }

    /// Collection runs ahead of a backlog of rate-limited acquisitions.
    pub fn priority(&self) -> Priority {
        match self {
            Job::Acquisition(_) => Priority::Normal,
            Job::GarbageCollection => Priority::High,
        }
    }

    pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: i32,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
fn decode_json(raw: Option<String>, column: &str) -> Result<Option<serde_json::Value>, sqlx::Error> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| sqlx::Error::Decode(format!("Failed to parse {}: {}", column, e).into()))
    })
    .transpose()
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for Task {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use super::timestamp::{decode, decode_opt};
        use sqlx::Row;
        Ok(Task {
            id: row.try_get("id")?,
            task_type: row.try_get::<String, _>("task_type")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse task_type: {}", e).into())
            })?,
            status: row.try_get::<String, _>("status")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse status: {}", e).into())
            })?,
            priority: row.try_get("priority")?,
            payload: decode_json(row.try_get("payload")?, "payload")?
                .unwrap_or(serde_json::Value::Null),
            result: decode_json(row.try_get("result")?, "result")?,
            scheduled_at: decode(row.try_get("scheduled_at")?, "scheduled_at")?,
            started_at: decode_opt(row.try_get("started_at")?, "started_at")?,
            completed_at: decode_opt(row.try_get("completed_at")?, "completed_at")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            created_at: decode(row.try_get("created_at")?, "created_at")?,
            updated_at: decode(row.try_get("updated_at")?, "updated_at")?,
        })
    }
}

impl Task {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Decode the payload into the job it carries.
    pub fn job(&self) -> Result<Job, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
