//! Error types for grain storage operations.
//!
//! Every failure surfaces as a [`StorageError`]. Version conflicts get their
//! own variant so callers can tell "re-read and retry" apart from storage
//! outages, which they usually cannot fix themselves.

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// The three grain state operations, used to label errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Clear,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "Read",
            Operation::Write => "Write",
            Operation::Clear => "Clear",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for grain storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to acquire connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The store rejected a write or clear because the caller's ETag was stale.
    #[error(
        "Version conflict ({operation}): name={provider} stateName={state_name} grainKey={grain_key} ETag={etag}"
    )]
    InconsistentState {
        operation: Operation,
        provider: String,
        state_name: String,
        grain_key: String,
        etag: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid ETag {0:?}: expected a non-negative integer")]
    InvalidETag(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Whether this error is an optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::InconsistentState { .. })
    }

    /// Whether the backing store could not be reached or failed to execute.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StorageError::Pool(_)
                | StorageError::Database(_)
                | StorageError::Unavailable(_)
                | StorageError::Task(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled)
    }
}
