use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::OUTPUT_EXTENSION;

/// A cached, fully processed content item shared by every session that holds an
/// association to it.
///
/// `title` is the dedup key: two requests resolving to the same title share one
/// row even when their `content_id`s differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: Uuid,
    pub title: String,
    pub content_id: String,
    pub channel: String,
    pub thumbnail_url: String,
    pub duration_seconds: i64,
    pub size_bytes: i64,
    pub file_name: String,
    /// True once fetch, transcode and tag all succeeded.
    pub downloaded: bool,
    pub expiration: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Attributes of a media row about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedia {
    pub title: String,
    pub content_id: String,
    pub channel: String,
    pub thumbnail_url: String,
    pub duration_seconds: i64,
    pub size_bytes: i64,
    pub file_name: String,
}

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9a-zA-Z \-()\[\]]+").expect("static regex"))
}

fn repeated_spaces() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" +").expect("static regex"))
}

/// File stem for a title: everything outside `[0-9A-Za-z -()[]]` is dropped and
/// runs of spaces collapse to one. Falls back to `fallback` when nothing is left.
pub fn file_stem_for_title(title: &str, fallback: &str) -> String {
    let stripped = disallowed_chars().replace_all(title, "");
    let collapsed = repeated_spaces().replace_all(&stripped, " ");
    let stem = collapsed.trim();
    if stem.is_empty() {
        disallowed_chars().replace_all(fallback, "").into_owned()
    } else {
        stem.to_string()
    }
}

/// Stored file name (stem plus the output extension) for a title.
pub fn stored_file_name(title: &str, fallback: &str) -> String {
    format!("{}.{}", file_stem_for_title(title, fallback), OUTPUT_EXTENSION)
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for Media {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use super::timestamp::decode;
        use sqlx::Row;
        Ok(Media {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            content_id: row.try_get("content_id")?,
            channel: row.try_get("channel")?,
            thumbnail_url: row.try_get("thumbnail_url")?,
            duration_seconds: row.try_get("duration_seconds")?,
            size_bytes: row.try_get("size_bytes")?,
            file_name: row.try_get("file_name")?,
            downloaded: row.try_get("downloaded")?,
            expiration: decode(row.try_get("expiration")?, "expiration")?,
            created_at: decode(row.try_get("created_at")?, "created_at")?,
        })
    }
}
