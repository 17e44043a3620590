//! Command implementations for grainctl.

pub mod init;
pub mod list;
pub mod state;

use anyhow::{Context, Result};
use grainstore::config::StorageOptions;
use grainstore::lifecycle::{Lifecycle, LifecycleContext};
use grainstore::VersionedGrainStore;

/// Open the configured database and ensure its schema exists.
pub async fn open_store(options: &StorageOptions) -> Result<VersionedGrainStore> {
    let store = VersionedGrainStore::open_sqlite(options)
        .with_context(|| format!("failed to open {}", options.connection_string))?;
    store
        .start(&LifecycleContext::new())
        .await
        .context("failed to initialize grain storage")?;
    tracing::debug!(
        provider = %store.name(),
        database = %options.connection_string,
        "Opened grain store"
    );
    Ok(store)
}
