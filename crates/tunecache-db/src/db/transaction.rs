//! Transaction guard for multi-statement cache writes.
//!
//! An acquisition commits its client, media and association writes as one unit.
//! The guard makes an uncommitted path explicit: dropping it without `commit` rolls
//! back (sqlx does this when the inner transaction is dropped) and logs a warning.

use anyhow::{Context, Result};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

pub struct TransactionGuard {
    transaction: Option<Transaction<'static, Sqlite>>,
    label: &'static str,
}

impl TransactionGuard {
    /// Begin a deferred transaction. `label` names the unit of work in logs.
    pub async fn begin(pool: &SqlitePool, label: &'static str) -> Result<Self> {
        let transaction = pool
            .begin()
            .await
            .with_context(|| format!("Failed to begin {} transaction", label))?;
        Ok(Self::wrap(transaction, label))
    }

    /// Begin a transaction that takes the write lock up front.
    ///
    /// A deferred transaction that reads first and writes later fails with
    /// `SQLITE_BUSY` as soon as another connection commits in between; the busy
    /// timeout only covers waiting at `BEGIN IMMEDIATE`. Use this for every
    /// read-then-write unit.
    pub async fn begin_immediate(pool: &SqlitePool, label: &'static str) -> Result<Self> {
        let transaction = pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .with_context(|| format!("Failed to begin {} transaction", label))?;
        Ok(Self::wrap(transaction, label))
    }

    fn wrap(transaction: Transaction<'static, Sqlite>, label: &'static str) -> Self {
        Self {
            transaction: Some(transaction),
            label,
        }
    }

    /// Connection to run statements on. Fails once the guard is finished.
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        match self.transaction.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(anyhow::anyhow!(
                "{} transaction was already committed or rolled back",
                self.label
            )),
        }
    }

    pub async fn commit(mut self) -> Result<()> {
        if let Some(tx) = self.transaction.take() {
            tx.commit()
                .await
                .with_context(|| format!("Failed to commit {} transaction", self.label))?;
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        if let Some(tx) = self.transaction.take() {
            tx.rollback()
                .await
                .with_context(|| format!("Failed to roll back {} transaction", self.label))?;
        }
        Ok(())
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            tracing::warn!(
                transaction = self.label,
                "Transaction dropped without commit or rollback, rolling back"
            );
        }
    }
}
