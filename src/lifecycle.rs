//! Two-phase start/stop lifecycle for storage providers.
//!
//! A process supervisor calls [`Lifecycle::start`] on every provider before
//! grain traffic begins and [`Lifecycle::stop`] on shutdown.

use async_trait::async_trait;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::serializer::GrainStateSerializer;
use crate::store::VersionedGrainStore;

/// Context handed to lifecycle callbacks.
#[derive(Debug, Clone, Default)]
pub struct LifecycleContext {
    /// Fires when the supervisor gives up on the current phase.
    pub cancel: CancellationToken,
}

impl LifecycleContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A component with explicit start and stop phases.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Prepare for traffic. An error is fatal to process startup.
    async fn start(&self, ctx: &LifecycleContext) -> Result<(), StorageError>;

    /// Release resources on shutdown.
    async fn stop(&self, ctx: &LifecycleContext) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: GrainStateSerializer> Lifecycle for VersionedGrainStore<S> {
    async fn start(&self, ctx: &LifecycleContext) -> Result<(), StorageError> {
        let start = Instant::now();

        let result = tokio::select! {
            result = self.backend().initialize() => result,
            () = ctx.cancel.cancelled() => Err(StorageError::Cancelled),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => tracing::info!(
                provider = %self.name(),
                stage = self.init_stage(),
                elapsed_ms,
                "Initialized grain storage provider"
            ),
            Err(e) => tracing::error!(
                provider = %self.name(),
                stage = self.init_stage(),
                elapsed_ms,
                error = %e,
                "Grain storage provider initialization failed"
            ),
        }
        result
    }

    async fn stop(&self, _ctx: &LifecycleContext) -> Result<(), StorageError> {
        tracing::info!(provider = %self.name(), "Stopped grain storage provider");
        Ok(())
    }
}
