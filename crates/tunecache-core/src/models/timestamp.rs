//! Timestamps are persisted as Unix milliseconds so eviction predicates are plain
//! integer comparisons in SQL.

use chrono::{DateTime, Utc};

pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Decode a millisecond column, reporting the column name on failure.
#[cfg(feature = "sqlx")]
pub fn decode(millis: i64, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    from_millis(millis).ok_or_else(|| {
        sqlx::Error::Decode(format!("{} out of range: {}", column, millis).into())
    })
}

#[cfg(feature = "sqlx")]
pub fn decode_opt(millis: Option<i64>, column: &str) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    millis.map(|m| decode(m, column)).transpose()
}
