//! Read-only connection pool for grain state reads.
//!
//! Uses r2d2 with r2d2_sqlite for pooled read access. Reads routed here never
//! take the write lock, at the price of possibly trailing a concurrent write.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::schema::apply_reader_pragmas;

/// Error type for reader pool operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Failed to create connection pool: {0}")]
    PoolCreation(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Read-only connection pool.
///
/// Provides pooled read-only connections for concurrent access.
/// SQLite WAL mode allows multiple concurrent readers.
#[derive(Clone)]
pub struct ReaderPool {
    pool: Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for ReaderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderPool")
            .field("state", &self.pool.state())
            .finish()
    }
}

impl ReaderPool {
    /// Create a new reader pool for the given database path.
    ///
    /// The database must already exist; the pool never creates it.
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        max_size: u32,
        busy_timeout: Duration,
    ) -> Result<Self, ReaderError> {
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);

        let pool = Pool::builder()
            .max_size(max_size)
            .connection_customizer(Box::new(ReaderConnectionCustomizer { busy_timeout }))
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, ReaderError> {
        Ok(self.pool.get()?)
    }

    /// The underlying pool, for callers that manage connections themselves.
    pub fn pool(&self) -> &Pool<SqliteConnectionManager> {
        &self.pool
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }
}

/// Connection customizer that applies reader pragmas.
#[derive(Debug)]
struct ReaderConnectionCustomizer {
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for ReaderConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        apply_reader_pragmas(conn, self.busy_timeout)
    }
}
