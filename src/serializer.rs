//! Grain state payload serialization.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use crate::error::StorageError;

/// Converts grain state values to and from stored payload bytes.
///
/// Implementations plug into [`VersionedGrainStore`](crate::VersionedGrainStore)
/// so the storage format can change without touching the version protocol.
pub trait GrainStateSerializer: Send + Sync + fmt::Debug {
    /// Serialize a state value to payload bytes.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StorageError>;

    /// Deserialize payload bytes.
    ///
    /// Returns `Ok(None)` when the payload encodes a null value.
    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<Option<T>, StorageError>;
}

/// JSON payloads via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl GrainStateSerializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value)
            .map_err(|e| StorageError::Serialization(format!("JSON error: {e}")))
    }

    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<Option<T>, StorageError> {
        serde_json::from_slice::<Option<T>>(payload)
            .map_err(|e| StorageError::Serialization(format!("JSON error: {e}")))
    }
}
