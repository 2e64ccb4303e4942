//! Tunecache Database Layer
//!
//! This crate provides the SQLite pool, migrations and repositories backing the
//! shared media cache and the persisted task queue.

pub mod db;

// Re-exports: repositories
pub use db::{AssociationRepository, ClientRepository, MediaRepository, TaskRepository};

// Re-exports: pool and transaction utilities
pub use db::pool::{create_pool, is_unique_violation, run_migrations, DatabaseConfig};
pub use db::transaction::TransactionGuard;
