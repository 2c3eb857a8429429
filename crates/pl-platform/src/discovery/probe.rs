//! Active TCP sweep of the local subnets, the low-frequency fallback for
//! peers the passive transports cannot hear.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::net_utils;
use pl_core::config::DiscoveryConfig;
use pl_core::ports::{
    BackgroundService, ClockPort, CycleSignal, LatencyProbePort, ServiceContext, ServiceError,
    ServiceWorker,
};
use pl_core::{DeviceRegistry, Sighting};

#[derive(Debug, Clone)]
struct ProbeSettings {
    every_cycles: u32,
    ports: Vec<u16>,
    connect_timeout: Duration,
    max_concurrency: usize,
    prefix_len: u8,
    targets: Vec<IpAddr>,
}

#[derive(Clone)]
pub struct SubnetProber {
    settings: ProbeSettings,
    registry: Arc<DeviceRegistry>,
    clock: Arc<dyn ClockPort>,
    probe: Arc<dyn LatencyProbePort>,
}

impl SubnetProber {
    pub fn new(
        config: &DiscoveryConfig,
        registry: Arc<DeviceRegistry>,
        clock: Arc<dyn ClockPort>,
        probe: Arc<dyn LatencyProbePort>,
    ) -> Self {
        Self {
            settings: ProbeSettings {
                every_cycles: config.probe.every_cycles.max(1),
                ports: config.probe.ports.clone(),
                connect_timeout: config.probe.connect_timeout(),
                max_concurrency: config.probe.max_concurrency.max(1),
                prefix_len: config.probe.prefix_len,
                targets: config.probe.targets.clone(),
            },
            registry,
            clock,
            probe,
        }
    }

    /// Endpoints for one sweep. Explicit targets are used as given; otherwise
    /// every host of every LAN subnet except our own addresses.
    fn sweep_targets(&self) -> Vec<SocketAddr> {
        let hosts: BTreeSet<IpAddr> = if self.settings.targets.is_empty() {
            let own = net_utils::local_addresses();
            net_utils::lan_ipv4_addrs()
                .into_iter()
                .flat_map(|ip| net_utils::subnet_hosts(ip, self.settings.prefix_len))
                .map(IpAddr::V4)
                .filter(|ip| !own.contains(ip))
                .collect()
        } else {
            self.settings.targets.iter().copied().collect()
        };

        hosts
            .into_iter()
            .flat_map(|ip| {
                self.settings
                    .ports
                    .iter()
                    .map(move |port| SocketAddr::new(ip, *port))
            })
            .collect()
    }

    /// Run one sweep. Stops early when `cancel` fires; connects already in
    /// flight are dropped with the stream. Returns the number of hits merged.
    pub async fn sweep(&self, cancel: &CancellationToken) -> usize {
        let targets = self.sweep_targets();
        if targets.is_empty() {
            debug!("no subnet probe targets");
            return 0;
        }
        debug!(targets = targets.len(), "subnet sweep started");

        let timeout = self.settings.connect_timeout;
        let probe = self.probe.clone();
        let mut hits = stream::iter(targets)
            .map(move |target| {
                let probe = probe.clone();
                async move { probe.probe(target, timeout).await.map(|_| target) }
            })
            .buffer_unordered(self.settings.max_concurrency);

        let mut found = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(found, "subnet sweep cancelled");
                    return found;
                }
                next = hits.next() => match next {
                    Some(Some(target)) => {
                        self.registry.merge(Sighting::probe(target, self.clock.now())).await;
                        found += 1;
                    }
                    Some(None) => {}
                    None => break,
                },
            }
        }
        info!(found, "subnet sweep finished");
        found
    }

    async fn schedule(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        let mut cycles = ctx.cycles();
        let mut heartbeats: u32 = 0;
        self.sweep(ctx.cancel_token()).await;

        loop {
            let due = tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                signal = cycles.recv() => match signal {
                    Ok(CycleSignal::ScanNow) => true,
                    Ok(CycleSignal::Heartbeat) => {
                        heartbeats = heartbeats.wrapping_add(1);
                        heartbeats % self.settings.every_cycles == 0
                    }
                    Err(RecvError::Lagged(_)) => false,
                    Err(RecvError::Closed) => return Ok(()),
                },
            };
            if due {
                self.sweep(ctx.cancel_token()).await;
            }
        }
    }
}

#[async_trait]
impl BackgroundService for SubnetProber {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ServiceWorker for SubnetProber {
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        self.schedule(ctx)
            .instrument(info_span!("platform.subnet_prober"))
            .await
    }
}
