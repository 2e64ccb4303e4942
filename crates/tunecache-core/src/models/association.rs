use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::format::{clock_duration, human_size};

/// A timestamped edge recording that a session currently has claim to a media
/// item. `request_time` is set once at creation and never renewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub id: Uuid,
    pub client_id: Uuid,
    pub media_id: Uuid,
    pub request_time: DateTime<Utc>,
}

/// An association joined with its media, as shown in a session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationView {
    pub association_id: Uuid,
    pub media_id: Uuid,
    pub title: String,
    pub author: String,
    pub thumbnail_url: String,
    pub downloaded: bool,
    pub file_name: String,
    pub size_bytes: i64,
    pub size: String,
    pub content_id: String,
    pub duration_seconds: i64,
    pub length: String,
    pub request_time: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for Association {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Association {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            media_id: row.try_get("media_id")?,
            request_time: super::timestamp::decode(row.try_get("request_time")?, "request_time")?,
        })
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for AssociationView {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let size_bytes: i64 = row.try_get("size_bytes")?;
        let duration_seconds: i64 = row.try_get("duration_seconds")?;
        Ok(AssociationView {
            association_id: row.try_get("association_id")?,
            media_id: row.try_get("media_id")?,
            title: row.try_get("title")?,
            author: row.try_get("channel")?,
            thumbnail_url: row.try_get("thumbnail_url")?,
            downloaded: row.try_get("downloaded")?,
            file_name: row.try_get("file_name")?,
            size_bytes,
            size: human_size(size_bytes),
            content_id: row.try_get("content_id")?,
            duration_seconds,
            length: clock_duration(duration_seconds),
            request_time: super::timestamp::decode(row.try_get("request_time")?, "request_time")?,
        })
    }
}
