//! Pooled SQLite access.
//!
//! Uses r2d2 with r2d2_sqlite. Blocking rusqlite calls run on tokio's
//! blocking pool so request tasks never stall a runtime worker.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;

use super::schema::{apply_pragmas, initialize_schema};
use super::StorageError;

/// Shared connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("state", &self.pool.state())
            .finish()
    }
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and apply the schema.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file
    /// * `max_size` - Maximum number of connections in the pool
    pub fn open<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)?;

        let conn = pool.get()?;
        initialize_schema(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        Ok(self.pool.get()?)
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }

    /// Run `f` against a pooled connection on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            Ok(f(&mut conn)?)
        })
        .await?
    }

    /// Check that a connection can be acquired and used.
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.run(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map(|_| ())
    }
}

/// Connection customizer that applies pragmas.
#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        apply_pragmas(conn)
    }
}
