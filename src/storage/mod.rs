//! Backing store layer for grain state.
//!
//! Provides:
//! - The [`BackingStore`] contract: read, version-checked write and clear
//! - SQLite schema and connection pragmas
//! - Read-only connection pool for replica-style reads
//! - SQLite and in-memory store implementations

pub mod memory;
pub mod reader;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;

/// A grain state row as seen by a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredRecord {
    /// No row exists for the key.
    Absent,
    /// A row exists but carries no payload (never written, or cleared).
    Empty { version: i64 },
    /// A row with a payload.
    Present { payload: Vec<u8>, version: i64 },
}

impl StoredRecord {
    pub fn version(&self) -> Option<i64> {
        match self {
            StoredRecord::Absent => None,
            StoredRecord::Empty { version } | StoredRecord::Present { version, .. } => {
                Some(*version)
            }
        }
    }
}

/// Storage engine holding one payload and one integer version per grain key.
///
/// Write and clear are atomic compare-and-swap operations on the version:
///
/// - `expected = None` succeeds only if no row exists, creating it at version 1
/// - `expected = Some(v)` succeeds only if the row is at version `v`, moving it
///   to `v + 1`
///
/// Success returns the resulting version. A rejected precondition returns
/// `Ok(None)` and writes nothing. Failures unrelated to the version check must
/// be returned as errors, never as `Ok(None)`.
#[async_trait]
pub trait BackingStore: Send + Sync + fmt::Debug {
    /// Prepare the store for traffic (create schema, check connectivity).
    async fn initialize(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Look up the row for a grain key.
    async fn read(
        &self,
        grain_key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredRecord, StorageError>;

    /// Store a new payload if the row is at the expected version.
    async fn write(
        &self,
        grain_key: &str,
        expected: Option<i64>,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Option<i64>, StorageError>;

    /// Remove the payload if the row is at the expected version, keeping the
    /// row and bumping its version.
    async fn clear(
        &self,
        grain_key: &str,
        expected: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<Option<i64>, StorageError>;
}
