//! In-memory backing store for tests and single-process development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use super::{BackingStore, StoredRecord};
use crate::error::StorageError;

#[derive(Debug, Clone)]
struct Row {
    payload: Option<Vec<u8>>,
    version: i64,
}

/// Backing store keeping rows in a `HashMap`.
///
/// Follows the same version rules as the SQLite store. State is lost when the
/// process exits. [`MemoryStore::set_available`] simulates an outage.
#[derive(Debug)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, Row>>,
    available: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent call fail with [`StorageError::Unavailable`]
    /// (`false`) or succeed again (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of rows, including cleared ones.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<String, Row>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, cancel: &CancellationToken) -> Result<(), StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }

    /// Apply `payload` to the row if it is at `expected`.
    fn swap(&self, grain_key: &str, expected: Option<i64>, payload: Option<Vec<u8>>) -> Option<i64> {
        let mut rows = self.rows();
        let current = rows.get(grain_key).map(|row| row.version);
        if current != expected {
            return None;
        }
        let version = current.map_or(1, |v| v + 1);
        rows.insert(grain_key.to_string(), Row { payload, version });
        Some(version)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        self.check(&CancellationToken::new())
    }

    async fn read(
        &self,
        grain_key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredRecord, StorageError> {
        self.check(cancel)?;
        Ok(match self.rows().get(grain_key) {
            None => StoredRecord::Absent,
            Some(Row {
                payload: Some(payload),
                version,
            }) if !payload.is_empty() => StoredRecord::Present {
                payload: payload.clone(),
                version: *version,
            },
            Some(row) => StoredRecord::Empty {
                version: row.version,
            },
        })
    }

    async fn write(
        &self,
        grain_key: &str,
        expected: Option<i64>,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Option<i64>, StorageError> {
        self.check(cancel)?;
        Ok(self.swap(grain_key, expected, Some(payload)))
    }

    async fn clear(
        &self,
        grain_key: &str,
        expected: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<Option<i64>, StorageError> {
        self.check(cancel)?;
        Ok(self.swap(grain_key, expected, None))
    }
}
