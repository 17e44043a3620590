//! Registry of named grain storage providers.
//!
//! Grains pick a provider by name; the one registered under
//! [`DEFAULT_PROVIDER_NAME`] serves grains that do not name one. The registry
//! also starts providers in ascending init stage and stops them in reverse.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ConfigError, StorageOptions, DEFAULT_PROVIDER_NAME};
use crate::error::StorageError;
use crate::lifecycle::{Lifecycle, LifecycleContext};
use crate::store::VersionedGrainStore;

/// Named grain storage providers built at process startup.
#[derive(Debug, Default)]
pub struct GrainStorageRegistry {
    stores: HashMap<String, Arc<VersionedGrainStore>>,
}

impl GrainStorageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a SQLite-backed provider for each set of options.
    ///
    /// All options are validated before any database is opened.
    pub fn from_options(options: &[StorageOptions]) -> Result<Self, StorageError> {
        for opts in options {
            opts.validate()?;
        }

        let mut registry = Self::new();
        for opts in options {
            let store = VersionedGrainStore::open_sqlite(opts)?;
            registry.register(Arc::new(store))?;
        }
        Ok(registry)
    }

    /// Add a provider under its own name.
    pub fn register(&mut self, store: Arc<VersionedGrainStore>) -> Result<(), ConfigError> {
        let name = store.name().to_string();
        if self.stores.contains_key(&name) {
            return Err(ConfigError::DuplicateName(name));
        }
        tracing::debug!(provider = %name, "Registered grain storage provider");
        self.stores.insert(name, store);
        Ok(())
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<VersionedGrainStore>> {
        self.stores.get(name).cloned()
    }

    /// The provider registered as [`DEFAULT_PROVIDER_NAME`], if any.
    pub fn default_store(&self) -> Option<Arc<VersionedGrainStore>> {
        self.get(DEFAULT_PROVIDER_NAME)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Providers ordered by (init stage, name).
    fn in_start_order(&self) -> Vec<Arc<VersionedGrainStore>> {
        let mut stores: Vec<_> = self.stores.values().cloned().collect();
        stores.sort_by(|a, b| {
            a.init_stage()
                .cmp(&b.init_stage())
                .then_with(|| a.name().cmp(b.name()))
        });
        stores
    }

    /// Start every provider; stops at the first failure.
    pub async fn start_all(&self, ctx: &LifecycleContext) -> Result<(), StorageError> {
        for store in self.in_start_order() {
            store.start(ctx).await?;
        }
        Ok(())
    }

    /// Stop every provider in reverse start order.
    ///
    /// Every provider is stopped even if one fails; the first error is returned.
    pub async fn stop_all(&self, ctx: &LifecycleContext) -> Result<(), StorageError> {
        let mut first_error = None;
        for store in self.in_start_order().into_iter().rev() {
            if let Err(e) = store.stop(ctx).await {
                tracing::warn!(provider = %store.name(), error = %e, "Failed to stop provider");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
