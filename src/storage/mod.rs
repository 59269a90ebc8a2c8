//! SQLite storage layer for Beacon.
//!
//! Provides:
//! - Schema initialization and connection pragmas
//! - Pooled connections with blocking calls off the runtime threads
//! - Demo models (users, products, configs) and a generic repository
//! - A repository wrapper that runs every call inside a database span

pub mod model;
pub mod pool;
pub mod repository;
pub mod schema;
pub mod traced;

pub use model::{ConfigEntry, Model, NewConfigEntry, NewProduct, NewUser, Product, User};
pub use pool::Database;
pub use repository::{Filter, Repository};
pub use traced::TracedRepository;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Short classification used for `error.type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pool(_) => "PoolError",
            Self::Database(_) => "DatabaseError",
            Self::Task(_) => "TaskError",
            Self::Io(_) => "IoError",
        }
    }
}
