//! Database repositories for data access layer
//!
//! Repositories are organized into cache/ (media, clients, associations) and the
//! task queue table. Each repository owns a clone of the pool; methods suffixed
//! `_in` take a connection so several of them can share one transaction.
//
// Shared cache repositories
pub mod cache;
//
// Pool creation and migrations
pub mod pool;
//
// Task queue repository
pub mod task;
//
// Transaction utilities
pub mod transaction;

pub use cache::{AssociationRepository, ClientRepository, MediaRepository};
pub use task::TaskRepository;
