//! The versioned grain store: read/write/clear with optimistic concurrency.
//!
//! The backing store owns the version counter. After a write or clear, a
//! returned version equal to the caller's, or no version at all, means the
//! store's own precondition check rejected the operation. That is surfaced as
//! [`StorageError::InconsistentState`] and the caller's [`GrainState`] is left
//! untouched. Nothing here retries; a loser in a write race must re-read.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::StorageOptions;
use crate::error::{Operation, StorageError};
use crate::grain::{GrainId, GrainState};
use crate::serializer::{GrainStateSerializer, JsonSerializer};
use crate::storage::{BackingStore, SqliteStore, StoredRecord};

/// Whether a write or clear result means the store rejected the operation.
fn is_version_conflict(returned: Option<i64>, expected: Option<i64>) -> bool {
    returned.is_none() || returned == expected
}

/// Grain storage provider enforcing ETag-based optimistic concurrency.
#[derive(Debug)]
pub struct VersionedGrainStore<S = JsonSerializer> {
    name: String,
    init_stage: i32,
    backend: Arc<dyn BackingStore>,
    serializer: S,
}

impl VersionedGrainStore<JsonSerializer> {
    /// Create a JSON-serializing store over any backing store.
    pub fn new(name: impl Into<String>, backend: Arc<dyn BackingStore>) -> Self {
        Self::with_serializer(name, backend, JsonSerializer)
    }

    /// Open a SQLite-backed store from provider options.
    pub fn open_sqlite(options: &StorageOptions) -> Result<Self, StorageError> {
        let backend = SqliteStore::open(options)?;
        Ok(Self::new(options.name.clone(), Arc::new(backend)).with_init_stage(options.init_stage))
    }
}

impl<S: GrainStateSerializer> VersionedGrainStore<S> {
    pub fn with_serializer(
        name: impl Into<String>,
        backend: Arc<dyn BackingStore>,
        serializer: S,
    ) -> Self {
        Self {
            name: name.into(),
            init_stage: crate::config::APPLICATION_SERVICES,
            backend,
            serializer,
        }
    }

    #[must_use]
    pub fn with_init_stage(mut self, init_stage: i32) -> Self {
        self.init_stage = init_stage;
        self
    }

    /// Provider name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifecycle stage at which this provider starts.
    pub fn init_stage(&self) -> i32 {
        self.init_stage
    }

    pub fn backend(&self) -> &Arc<dyn BackingStore> {
        &self.backend
    }

    /// Load a grain's state from the store into `grain_state`.
    pub async fn read_state<T>(
        &self,
        state_name: &str,
        grain_id: &GrainId,
        grain_state: &mut GrainState<T>,
    ) -> Result<(), StorageError>
    where
        T: DeserializeOwned + Default,
    {
        self.read_state_cancellable(state_name, grain_id, grain_state, &CancellationToken::new())
            .await
    }

    /// Persist `grain_state.state` if its ETag matches the stored version.
    pub async fn write_state<T>(
        &self,
        state_name: &str,
        grain_id: &GrainId,
        grain_state: &mut GrainState<T>,
    ) -> Result<(), StorageError>
    where
        T: Serialize,
    {
        self.write_state_cancellable(state_name, grain_id, grain_state, &CancellationToken::new())
            .await
    }

    /// Void the stored payload if the ETag matches the stored version.
    pub async fn clear_state<T>(
        &self,
        state_name: &str,
        grain_id: &GrainId,
        grain_state: &mut GrainState<T>,
    ) -> Result<(), StorageError>
    where
        T: Default,
    {
        self.clear_state_cancellable(state_name, grain_id, grain_state, &CancellationToken::new())
            .await
    }

    /// [`read_state`](Self::read_state) with an external cancellation signal.
    #[tracing::instrument(
        name = "read_state",
        skip(self, grain_state, cancel),
        fields(provider = %self.name, grain_key)
    )]
    pub async fn read_state_cancellable<T>(
        &self,
        state_name: &str,
        grain_id: &GrainId,
        grain_state: &mut GrainState<T>,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>
    where
        T: DeserializeOwned + Default,
    {
        let grain_key = grain_id.storage_key();
        tracing::Span::current().record("grain_key", grain_key.as_str());
        tracing::trace!(etag = ?grain_state.etag, "Reading grain state");

        let record = self
            .backend
            .read(&grain_key, cancel)
            .await
            .inspect_err(|e| self.log_failure(Operation::Read, grain_state.etag.as_deref(), e))?;

        let (state, etag, record_exists) = match record {
            StoredRecord::Present { payload, version } => {
                let decoded: Option<T> = self.serializer.deserialize(&payload).inspect_err(|e| {
                    self.log_failure(Operation::Read, grain_state.etag.as_deref(), e);
                })?;
                let exists = decoded.is_some();
                (decoded.unwrap_or_default(), Some(version), exists)
            }
            StoredRecord::Empty { version } => {
                tracing::info!(version, "Null grain state read (default will be instantiated)");
                (T::default(), Some(version), false)
            }
            StoredRecord::Absent => {
                tracing::info!("Null grain state read (default will be instantiated)");
                (T::default(), None, false)
            }
        };

        grain_state.state = state;
        grain_state.etag = etag.map(|v| v.to_string());
        grain_state.record_exists = record_exists;

        tracing::trace!(etag = ?grain_state.etag, record_exists, "Read grain state");
        Ok(())
    }

    /// [`write_state`](Self::write_state) with an external cancellation signal.
    #[tracing::instrument(
        name = "write_state",
        skip(self, grain_state, cancel),
        fields(provider = %self.name, grain_key)
    )]
    pub async fn write_state_cancellable<T>(
        &self,
        state_name: &str,
        grain_id: &GrainId,
        grain_state: &mut GrainState<T>,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>
    where
        T: Serialize,
    {
        let grain_key = grain_id.storage_key();
        tracing::Span::current().record("grain_key", grain_key.as_str());

        let expected = grain_state.expected_version()?;
        let payload = self.serializer.serialize(&grain_state.state)?;
        tracing::trace!(etag = ?grain_state.etag, bytes = payload.len(), "Writing grain state");

        let returned = self
            .backend
            .write(&grain_key, expected, payload, cancel)
            .await
            .inspect_err(|e| self.log_failure(Operation::Write, grain_state.etag.as_deref(), e))?;

        let version = self.check_version(Operation::Write, state_name, &grain_key, returned, expected)?;

        grain_state.etag = Some(version.to_string());
        grain_state.record_exists = true;

        tracing::trace!(etag = ?grain_state.etag, "Wrote grain state");
        Ok(())
    }

    /// [`clear_state`](Self::clear_state) with an external cancellation signal.
    #[tracing::instrument(
        name = "clear_state",
        skip(self, grain_state, cancel),
        fields(provider = %self.name, grain_key)
    )]
    pub async fn clear_state_cancellable<T>(
        &self,
        state_name: &str,
        grain_id: &GrainId,
        grain_state: &mut GrainState<T>,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>
    where
        T: Default,
    {
        let grain_key = grain_id.storage_key();
        tracing::Span::current().record("grain_key", grain_key.as_str());

        let expected = grain_state.expected_version()?;
        tracing::trace!(etag = ?grain_state.etag, "Clearing grain state");

        let returned = self
            .backend
            .clear(&grain_key, expected, cancel)
            .await
            .inspect_err(|e| self.log_failure(Operation::Clear, grain_state.etag.as_deref(), e))?;

        let version = self.check_version(Operation::Clear, state_name, &grain_key, returned, expected)?;

        grain_state.state = T::default();
        grain_state.etag = Some(version.to_string());
        grain_state.record_exists = false;

        tracing::trace!(etag = ?grain_state.etag, "Cleared grain state");
        Ok(())
    }

    /// Turn a write/clear result into the new version or a conflict error.
    fn check_version(
        &self,
        operation: Operation,
        state_name: &str,
        grain_key: &str,
        returned: Option<i64>,
        expected: Option<i64>,
    ) -> Result<i64, StorageError> {
        match returned {
            Some(version) if !is_version_conflict(returned, expected) => Ok(version),
            _ => {
                let etag = expected.map(|v| v.to_string()).unwrap_or_default();
                tracing::debug!(
                    operation = %operation,
                    etag = %etag,
                    returned = ?returned,
                    "Version conflict"
                );
                Err(StorageError::InconsistentState {
                    operation,
                    provider: self.name.clone(),
                    state_name: state_name.to_string(),
                    grain_key: grain_key.to_string(),
                    etag,
                })
            }
        }
    }

    fn log_failure(&self, operation: Operation, etag: Option<&str>, error: &StorageError) {
        if error.is_cancelled() {
            tracing::debug!(operation = %operation, etag = ?etag, "Grain state operation cancelled");
        } else {
            tracing::error!(operation = %operation, etag = ?etag, error = %error, "Grain state operation failed");
        }
    }
}
