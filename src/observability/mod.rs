//! Observability infrastructure.
//!
//! Provides structured logging setup for binaries and tests.

pub mod tracing;
