use async_trait::async_trait;
use pl_core::ports::{
    BackgroundService, ClockPort, ServiceContext, ServiceError, ServiceWorker, SnapshotStorePort,
    StorageError,
};
use pl_core::DeviceRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

/// Moves registry snapshots between the registry and the snapshot store:
/// restore at start, periodic saves while running, and a final save at stop.
#[derive(Clone)]
pub struct SnapshotSaver {
    registry: Arc<DeviceRegistry>,
    store: Arc<dyn SnapshotStorePort>,
    clock: Arc<dyn ClockPort>,
    interval: Duration,
}

impl SnapshotSaver {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        store: Arc<dyn SnapshotStorePort>,
        clock: Arc<dyn ClockPort>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            interval,
        }
    }

    /// Load the last snapshot into the registry. A missing or unreadable
    /// snapshot leaves the registry empty; it never blocks startup.
    pub async fn restore(&self) -> usize {
        match self.store.load().await {
            Ok(Some(snapshot)) => {
                let restored = self.registry.restore(snapshot).await;
                info!(restored, "Restored device registry");
                restored
            }
            Ok(None) => {
                debug!("No registry snapshot to restore");
                0
            }
            Err(err) => {
                warn!(error = %err, "Failed to load registry snapshot, starting empty");
                0
            }
        }
    }

    /// Returns the number of records written.
    pub async fn save_once(&self) -> Result<usize, StorageError> {
        let snapshot = self.registry.snapshot(self.clock.now()).await;
        let count = snapshot.devices.len();
        self.store.save(&snapshot).await?;
        debug!(count, "Saved registry snapshot");
        Ok(count)
    }
}

#[async_trait]
impl BackgroundService for SnapshotSaver {
    fn name(&self) -> &'static str {
        "snapshot_saver"
    }

    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ServiceWorker for SnapshotSaver {
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        async {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.save_once().await {
                            warn!(error = %err, "Periodic registry snapshot failed");
                        }
                    }
                }
            }
            Ok(())
        }
        .instrument(info_span!("app.snapshot_saver"))
        .await
    }
}
