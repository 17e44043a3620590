//! Grainstore: versioned grain state persistence over SQLite.
//!
//! Grainstore stores serialized virtual-actor ("grain") state as one row per
//! grain and guards every write and clear with an integer version token, the
//! ETag. A caller that writes with a stale ETag gets a conflict instead of a
//! lost update.
//!
//! # Architecture
//!
//! - **Adapter**: [`VersionedGrainStore`] runs the read/write/clear protocol
//!   and the conflict check
//! - **Backing stores**: [`storage::SqliteStore`] (r2d2 pooled) and
//!   [`storage::MemoryStore`], both behind the [`storage::BackingStore`] trait
//! - **Hosting**: [`registry::GrainStorageRegistry`] holds named providers and
//!   drives their [`lifecycle::Lifecycle`]
//!
//! # Modules
//!
//! - [`config`]: Provider options, validation and CLI arguments
//! - [`error`]: Error taxonomy shared by every operation
//! - [`grain`]: Grain identity, storage key encoding and in-memory state
//! - [`lifecycle`]: Two-phase start/stop interface
//! - [`observability`]: Tracing setup
//! - [`registry`]: Named provider registry
//! - [`serializer`]: Pluggable payload serializers
//! - [`storage`]: Backing store contract and implementations
//! - [`store`]: The versioned grain store adapter

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // storage::sqlite::SqliteStore is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::similar_names               // etag/expected/version are fine
)]

pub mod config;
pub mod error;
pub mod grain;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod serializer;
pub mod storage;
pub mod store;

pub use error::StorageError;
pub use grain::{GrainId, GrainKey, GrainState};
pub use store::VersionedGrainStore;

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
