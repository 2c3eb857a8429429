use async_trait::async_trait;
use pl_core::ports::{BackgroundService, ClockPort, ServiceContext, ServiceError, ServiceWorker};
use pl_core::{DeviceId, DeviceRegistry};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, info_span, Instrument};

/// Moves silent devices offline once per discovery cycle.
#[derive(Clone)]
pub struct StaleExpiry {
    registry: Arc<DeviceRegistry>,
    clock: Arc<dyn ClockPort>,
}

impl StaleExpiry {
    pub fn new(registry: Arc<DeviceRegistry>, clock: Arc<dyn ClockPort>) -> Self {
        Self { registry, clock }
    }

    pub async fn expire_once(&self) -> Vec<DeviceId> {
        let expired = self.registry.expire_stale(self.clock.now()).await;
        if !expired.is_empty() {
            info!(count = expired.len(), "Devices went offline");
        }
        expired
    }
}

#[async_trait]
impl BackgroundService for StaleExpiry {
    fn name(&self) -> &'static str {
        "stale_expiry"
    }

    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ServiceWorker for StaleExpiry {
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        async {
            let mut cycles = ctx.cycles();
            self.expire_once().await;
            loop {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break,
                    signal = cycles.recv() => match signal {
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            self.expire_once().await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            Ok(())
        }
        .instrument(info_span!("app.stale_expiry"))
        .await
    }
}
