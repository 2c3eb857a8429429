//! Supervised background services.
//!
//! Every transport and monitor is a [`BackgroundService`]. The coordinator
//! calls [`BackgroundService::prepare`] while starting, so bind failures are
//! reported synchronously, then runs the returned [`ServiceWorker`] under a
//! supervisor until the context is cancelled.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{StorageError, TransportError};
use crate::registry::RegistryError;

/// Tick of the shared discovery schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleSignal {
    /// Regular heartbeat, one per broadcast interval.
    Heartbeat,
    /// Forced passive + active cycle requested through `scan_now`.
    ScanNow,
}

#[derive(Clone)]
pub struct ServiceContext {
    cancel: CancellationToken,
    cycles: broadcast::Sender<CycleSignal>,
}

impl ServiceContext {
    pub fn new(cancel: CancellationToken, cycles: broadcast::Sender<CycleSignal>) -> Self {
        Self { cancel, cycles }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Subscribe to the shared discovery schedule. Only signals sent after this
    /// call are observed.
    pub fn cycles(&self) -> broadcast::Receiver<CycleSignal> {
        self.cycles.subscribe()
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait BackgroundService: Send + Sync {
    fn name(&self) -> &'static str;

    /// A required service that fails `prepare` aborts the whole start.
    fn required(&self) -> bool {
        false
    }

    /// Acquire listening resources and return the worker that will use them.
    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError>;
}

#[async_trait]
pub trait ServiceWorker: Send + Sync {
    /// Run until `ctx` is cancelled. Returning `Err` (or panicking) makes the
    /// supervisor log the failure and restart the worker after a delay.
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError>;
}
