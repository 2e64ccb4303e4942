use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use tunecache_core::models::timestamp::to_millis;
use tunecache_core::models::{Media, NewMedia};

const MEDIA_COLUMNS: &str = "id, title, content_id, channel, thumbnail_url, duration_seconds, \
     size_bytes, file_name, downloaded, expiration, created_at";

/// Media rows of the shared cache.
///
/// Methods ending in `_in` run on a caller-supplied connection so the acquisition
/// pipeline can compose them into one transaction.
#[derive(Clone)]
pub struct MediaRepository {
    pool: SqlitePool,
}

impl MediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Option<Media>> {
        let sql = format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS);
        sqlx::query_as::<_, Media>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch media")
    }

    /// Exact-title lookup; the title is the dedup key.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_title(&self, title: &str) -> Result<Option<Media>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::find_by_title_in(&mut conn, title).await
    }

    pub async fn find_by_title_in(conn: &mut SqliteConnection, title: &str) -> Result<Option<Media>> {
        let sql = format!("SELECT {} FROM media WHERE title = ?", MEDIA_COLUMNS);
        sqlx::query_as::<_, Media>(&sql)
            .bind(title)
            .fetch_optional(conn)
            .await
            .context("Failed to look up media by title")
    }

    pub async fn find_by_file_name(&self, file_name: &str) -> Result<Option<Media>> {
        let sql = format!("SELECT {} FROM media WHERE file_name = ?", MEDIA_COLUMNS);
        sqlx::query_as::<_, Media>(&sql)
            .bind(file_name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up media by file name")
    }

    /// Insert a fully processed media row. Fails with a UNIQUE violation (reachable
    /// through `anyhow::Error::downcast_ref::<sqlx::Error>`) when the title exists.
    pub async fn create_in(
        conn: &mut SqliteConnection,
        new: &NewMedia,
        created_at: DateTime<Utc>,
        expiration: DateTime<Utc>,
    ) -> Result<Media> {
        let sql = format!(
            r#"
            INSERT INTO media (
                id, title, content_id, channel, thumbnail_url, duration_seconds,
                size_bytes, file_name, downloaded, expiration, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            RETURNING {}
            "#,
            MEDIA_COLUMNS
        );

        let media = sqlx::query_as::<_, Media>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.content_id)
            .bind(&new.channel)
            .bind(&new.thumbnail_url)
            .bind(new.duration_seconds)
            .bind(new.size_bytes)
            .bind(&new.file_name)
            .bind(to_millis(expiration))
            .bind(to_millis(created_at))
            .fetch_one(conn)
            .await
            .context("Failed to insert media")?;

        tracing::debug!(media_id = %media.id, title = %media.title, "Media row inserted");
        Ok(media)
    }

    /// Compare-and-swap the expiration: only applies if the row still carries
    /// `expected`. Returns whether the row was updated.
    pub async fn extend_expiration_in(
        conn: &mut SqliteConnection,
        id: Uuid,
        expected: DateTime<Utc>,
        new_expiration: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE media
            SET expiration = ?
            WHERE id = ? AND expiration = ? AND ? > expiration
            "#,
        )
        .bind(to_millis(new_expiration))
        .bind(id)
        .bind(to_millis(expected))
        .bind(to_millis(new_expiration))
        .execute(conn)
        .await
        .context("Failed to extend media expiration")?;

        Ok(result.rows_affected() == 1)
    }

    /// Media that no association references and whose expiration has passed.
    #[tracing::instrument(skip(self))]
    pub async fn list_orphaned_expired(&self, now: DateTime<Utc>) -> Result<Vec<Media>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media m
            WHERE m.expiration < ?
              AND NOT EXISTS (SELECT 1 FROM associations a WHERE a.media_id = m.id)
            ORDER BY m.expiration ASC
            "#,
            MEDIA_COLUMNS
        );
        sqlx::query_as::<_, Media>(&sql)
            .bind(to_millis(now))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list orphaned expired media")
    }

    /// Delete a media row if it is still orphaned and expired at `now`. An
    /// association created since the listing keeps the row alive.
    #[tracing::instrument(skip(self))]
    pub async fn delete_if_orphaned_expired(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM media
            WHERE id = ?
              AND expiration < ?
              AND NOT EXISTS (SELECT 1 FROM associations WHERE media_id = ?)
            "#,
        )
        .bind(id)
        .bind(to_millis(now))
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to delete media")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete media")?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM media")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count media")
    }
}
