use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use tunecache_core::models::timestamp::to_millis;
use tunecache_core::models::Client;

#[derive(Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, session_token))]
    pub async fn get_by_token(&self, session_token: &str) -> Result<Option<Client>> {
        sqlx::query_as::<_, Client>(
            "SELECT id, session_token, joined_at FROM clients WHERE session_token = ?",
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch client")
    }

    #[tracing::instrument(skip(self, session_token))]
    pub async fn get_or_create(&self, session_token: &str, now: DateTime<Utc>) -> Result<Client> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::get_or_create_in(&mut conn, session_token, now).await
    }

    /// Insert the session if it is unknown, then return its row. Concurrent callers
    /// with the same token converge on one row.
    pub async fn get_or_create_in(
        conn: &mut SqliteConnection,
        session_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Client> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO clients (id, session_token, joined_at)
            VALUES (?, ?, ?)
            ON CONFLICT (session_token) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_token)
        .bind(to_millis(now))
        .execute(&mut *conn)
        .await
        .context("Failed to insert client")?;

        if inserted.rows_affected() == 1 {
            tracing::debug!("New client session registered");
        }

        sqlx::query_as::<_, Client>(
            "SELECT id, session_token, joined_at FROM clients WHERE session_token = ?",
        )
        .bind(session_token)
        .fetch_one(conn)
        .await
        .context("Failed to read back client")
    }
}
