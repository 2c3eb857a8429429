use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use pl_core::config::QualityConfig;
use pl_core::network::quality;
use pl_core::ports::{
    BackgroundService, LatencyProbePort, ServiceContext, ServiceError, ServiceWorker,
};
use pl_core::{DeviceRegistry, RegistryError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info_span, trace, warn, Instrument};

const MAX_CONCURRENT_PROBES: usize = 16;

/// Periodically measures every live device's primary endpoint and folds the
/// bucketed latency into its moving-average quality score.
#[derive(Clone)]
pub struct QualityMonitor {
    registry: Arc<DeviceRegistry>,
    latency: Arc<dyn LatencyProbePort>,
    interval: Duration,
    probe_timeout: Duration,
    smoothing: f64,
}

impl QualityMonitor {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        latency: Arc<dyn LatencyProbePort>,
        config: &QualityConfig,
    ) -> Self {
        Self {
            registry,
            latency,
            interval: config.interval(),
            probe_timeout: config.probe_timeout(),
            smoothing: config.smoothing,
        }
    }

    /// One measurement round. Returns how many devices were updated.
    pub async fn measure_once(&self) -> usize {
        let targets: Vec<_> = self
            .registry
            .list()
            .await
            .into_iter()
            .filter(|record| record.status.is_live())
            .filter_map(|record| {
                let endpoint = record.primary_endpoint()?.socket_addr();
                Some((record.id, endpoint))
            })
            .collect();

        let samples: Vec<_> = stream::iter(targets)
            .map(|(id, endpoint)| {
                let latency = self.latency.clone();
                let timeout = self.probe_timeout;
                async move { (id, latency.probe(endpoint, timeout).await) }
            })
            .buffer_unordered(MAX_CONCURRENT_PROBES)
            .collect()
            .await;

        let mut updated = 0;
        for (id, rtt) in samples {
            let sample = quality::bucket_latency(rtt);
            match self
                .registry
                .set_quality(&id, sample, self.smoothing, rtt)
                .await
            {
                Ok(score) => {
                    trace!(device_id = %id, ?rtt, sample, score, "Quality sample");
                    updated += 1;
                }
                Err(RegistryError::UnknownDevice(_)) => {
                    debug!(device_id = %id, "Device forgotten during quality round");
                }
                Err(err) => warn!(device_id = %id, error = %err, "Failed to store quality"),
            }
        }
        updated
    }
}

#[async_trait]
impl BackgroundService for QualityMonitor {
    fn name(&self) -> &'static str {
        "quality_monitor"
    }

    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ServiceWorker for QualityMonitor {
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        let span = info_span!("app.quality_monitor", interval_secs = self.interval.as_secs());
        async {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break,
                    updated = self.measure_once() => debug!(updated, "Quality round finished"),
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}
