use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use tunecache_core::models::timestamp::to_millis;
use tunecache_core::models::{Association, AssociationView};

use crate::db::transaction::TransactionGuard;

const VIEW_SELECT: &str = r#"
    SELECT
        a.id AS association_id,
        m.id AS media_id,
        m.title,
        m.channel,
        m.thumbnail_url,
        m.downloaded,
        m.file_name,
        m.size_bytes,
        m.content_id,
        m.duration_seconds,
        a.request_time
    FROM associations a
    JOIN clients c ON c.id = a.client_id
    JOIN media m ON m.id = a.media_id
"#;

/// Client/media edges.
#[derive(Clone)]
pub struct AssociationRepository {
    pool: SqlitePool,
}

impl AssociationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_in(
        conn: &mut SqliteConnection,
        client_id: Uuid,
        media_id: Uuid,
        request_time: DateTime<Utc>,
    ) -> Result<Association> {
        let association = sqlx::query_as::<_, Association>(
            r#"
            INSERT INTO associations (id, client_id, media_id, request_time)
            VALUES (?, ?, ?, ?)
            RETURNING id, client_id, media_id, request_time
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(media_id)
        .bind(to_millis(request_time))
        .fetch_one(conn)
        .await
        .context("Failed to insert association")?;

        tracing::debug!(
            association_id = %association.id,
            client_id = %client_id,
            media_id = %media_id,
            "Association created"
        );
        Ok(association)
    }

    pub async fn exists_in(
        conn: &mut SqliteConnection,
        client_id: Uuid,
        media_id: Uuid,
    ) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM associations WHERE client_id = ? AND media_id = ? LIMIT 1",
        )
        .bind(client_id)
        .bind(media_id)
        .fetch_optional(conn)
        .await
        .context("Failed to check association")?;
        Ok(found.is_some())
    }

    /// Everything a session currently holds, oldest request first.
    #[tracing::instrument(skip(self, session_token))]
    pub async fn list_for_session(&self, session_token: &str) -> Result<Vec<AssociationView>> {
        let sql = format!(
            "{} WHERE c.session_token = ? ORDER BY a.request_time ASC",
            VIEW_SELECT
        );
        sqlx::query_as::<_, AssociationView>(&sql)
            .bind(session_token)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list associations")
    }

    #[tracing::instrument(skip(self, session_token))]
    pub async fn find_for_session_by_file_name(
        &self,
        session_token: &str,
        file_name: &str,
    ) -> Result<Option<AssociationView>> {
        let sql = format!(
            "{} WHERE c.session_token = ? AND m.file_name = ? ORDER BY a.request_time ASC LIMIT 1",
            VIEW_SELECT
        );
        sqlx::query_as::<_, AssociationView>(&sql)
            .bind(session_token)
            .bind(file_name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to find association by file name")
    }

    /// Whether the session already holds media with this platform content id.
    #[tracing::instrument(skip(self, session_token))]
    pub async fn session_holds_content(&self, session_token: &str, content_id: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1
            FROM associations a
            JOIN clients c ON c.id = a.client_id
            JOIN media m ON m.id = a.media_id
            WHERE c.session_token = ? AND m.content_id = ?
            LIMIT 1
            "#,
        )
        .bind(session_token)
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to check session content")?;
        Ok(found.is_some())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM associations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete association")?;
        Ok(result.rows_affected() == 1)
    }

    /// Delete all of `ids` in one commit. Either every claim is released or none.
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn delete_all(&self, ids: &[Uuid]) -> Result<u64> {
        let mut tx = TransactionGuard::begin_immediate(&self.pool, "bulk release").await?;
        let mut deleted = 0;
        for id in ids {
            deleted += sqlx::query("DELETE FROM associations WHERE id = ?")
                .bind(id)
                .execute(&mut *tx.conn()?)
                .await
                .context("Failed to delete association")?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    /// Delete every association with `request_time` strictly before `cutoff`.
    #[tracing::instrument(skip(self))]
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM associations WHERE request_time < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await
            .context("Failed to delete expired associations")?;
        Ok(result.rows_affected())
    }

    pub async fn count_for_media(&self, media_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM associations WHERE media_id = ?")
            .bind(media_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count associations")
    }
}
