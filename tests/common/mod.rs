//! Test utilities shared by the grain storage integration tests.
//!
//! Provides:
//! - Temporary database fixtures
//! - Started SQLite and in-memory stores
//! - A small grain state type

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use grainstore::config::StorageOptions;
use grainstore::lifecycle::{Lifecycle, LifecycleContext};
use grainstore::storage::MemoryStore;
use grainstore::VersionedGrainStore;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        grainstore::observability::tracing::init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }

    /// Get the database path as a string.
    pub fn db_path_str(&self) -> &str {
        self.db_path.to_str().expect("invalid path")
    }

    /// Provider options pointing at this fixture's database.
    pub fn options(&self, name: &str) -> StorageOptions {
        StorageOptions::new(name, self.db_path_str())
    }

    /// Open and start a SQLite-backed store.
    pub async fn sqlite_store(&self) -> VersionedGrainStore {
        self.start(self.options("Default")).await
    }

    /// Open and start a SQLite-backed store that reads through read-only
    /// connections.
    pub async fn sqlite_store_read_only_intent(&self) -> VersionedGrainStore {
        let mut options = self.options("Default");
        options.use_read_only_intent = true;
        self.start(options).await
    }

    async fn start(&self, options: StorageOptions) -> VersionedGrainStore {
        let store = VersionedGrainStore::open_sqlite(&options).expect("failed to open store");
        store
            .start(&LifecycleContext::new())
            .await
            .expect("failed to start store");
        store
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A started in-memory store and its backend handle.
pub async fn memory_store() -> (Arc<MemoryStore>, VersionedGrainStore) {
    grainstore::observability::tracing::init_test_tracing();
    let backend = Arc::new(MemoryStore::new());
    let store = VersionedGrainStore::new("Default", backend.clone());
    store
        .start(&LifecycleContext::new())
        .await
        .expect("failed to start store");
    (backend, store)
}

/// Grain state used throughout the integration tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<String>,
    pub total_cents: i64,
}

impl Cart {
    pub fn with_items(items: &[&str]) -> Self {
        Self {
            items: items.iter().map(|s| s.to_string()).collect(),
            total_cents: items.len() as i64 * 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert!(fixture.db_path_str().contains("test.db"));
    }
}
