//! Reacts to devices coming online: restores `Paired` for peers that are
//! already trusted, and starts automatic pairing for eligible untrusted ones.
//!
//! A device that ended up `Rejected` is never evaluated again; only an
//! explicit pairing request moves it out of that state.

use async_trait::async_trait;
use pl_core::ports::{BackgroundService, ServiceContext, ServiceError, ServiceWorker};
use pl_core::{AutoPairPolicy, DeviceEvent, DeviceId, DeviceRegistry, DeviceStatus, TrustState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, info_span, warn, Instrument};

use super::PairDevice;
use crate::errors::PairingError;

pub struct TrustEvaluator {
    registry: Arc<DeviceRegistry>,
    pairing: Arc<PairDevice>,
    policy: AutoPairPolicy,
    auto_pair: bool,
}

impl TrustEvaluator {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        pairing: Arc<PairDevice>,
        policy: AutoPairPolicy,
        auto_pair: bool,
    ) -> Self {
        Self {
            registry,
            pairing,
            policy,
            auto_pair,
        }
    }
}

#[async_trait]
impl BackgroundService for TrustEvaluator {
    fn name(&self) -> &'static str {
        "trust_evaluator"
    }

    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError> {
        // Subscribe now so nothing merged between prepare and run is missed.
        Ok(Arc::new(TrustEvaluatorWorker {
            registry: self.registry.clone(),
            pairing: self.pairing.clone(),
            policy: self.policy.clone(),
            auto_pair: self.auto_pair,
            events: Mutex::new(self.registry.subscribe()),
        }))
    }
}

struct TrustEvaluatorWorker {
    registry: Arc<DeviceRegistry>,
    pairing: Arc<PairDevice>,
    policy: AutoPairPolicy,
    auto_pair: bool,
    events: Mutex<broadcast::Receiver<DeviceEvent>>,
}

/// Automatic pairings in flight, keyed by task.
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<()>,
    devices: HashMap<task::Id, DeviceId>,
}

impl InFlight {
    fn contains(&self, id: &DeviceId) -> bool {
        self.devices.values().any(|pending| pending == id)
    }

    fn finished(&mut self, joined: Result<(task::Id, ()), task::JoinError>) {
        let task_id = match joined {
            Ok((task_id, ())) => task_id,
            Err(err) => {
                warn!(error = %err, "Automatic pairing task failed");
                err.id()
            }
        };
        self.devices.remove(&task_id);
    }
}

#[async_trait]
impl ServiceWorker for TrustEvaluatorWorker {
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        let span = info_span!("app.trust_evaluator", auto_pair = self.auto_pair);
        async {
            let mut events = self.events.lock().await;
            let mut in_flight = InFlight::default();

            self.sweep(&mut in_flight).await;

            loop {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break,
                    Some(joined) = in_flight.tasks.join_next_with_id(), if !in_flight.tasks.is_empty() => {
                        in_flight.finished(joined);
                    }
                    received = events.recv() => match received {
                        Ok(event) => {
                            if let Some(id) = came_online(&event) {
                                self.evaluate(id, &mut in_flight).await;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Trust evaluator lagged, re-evaluating all online devices");
                            self.sweep(&mut in_flight).await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            in_flight.tasks.shutdown().await;
            for id in in_flight.devices.values() {
                if self.registry.abandon_pairing(id).await {
                    debug!(device_id = %id, "Abandoned interrupted automatic pairing");
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}

impl TrustEvaluatorWorker {
    async fn sweep(&self, in_flight: &mut InFlight) {
        for record in self.registry.list().await {
            if record.status == DeviceStatus::Online {
                self.evaluate(&record.id, in_flight).await;
            }
        }
    }

    async fn evaluate(&self, id: &DeviceId, in_flight: &mut InFlight) {
        let Some(record) = self.registry.get(id).await else {
            return;
        };
        if record.status != DeviceStatus::Online {
            return;
        }

        match record.trust {
            TrustState::Trusted => match self.registry.set_status(id, DeviceStatus::Paired).await {
                Ok(_) => info!(device_id = %id, "Trusted device back online, restored pairing"),
                Err(err) => debug!(device_id = %id, error = %err, "Could not restore pairing"),
            },
            TrustState::Untrusted if self.auto_pair => {
                if id.is_probe_placeholder() || in_flight.contains(id) {
                    return;
                }
                let Some(eligibility) = self.policy.evaluate(&record) else {
                    return;
                };
                info!(device_id = %id, ?eligibility, "Device eligible for automatic pairing");

                let pairing = self.pairing.clone();
                let device_id = id.clone();
                let handle = in_flight.tasks.spawn(
                    async move {
                        match pairing.execute(&device_id, None).await {
                            Ok(_) => {}
                            Err(PairingError::AlreadyPending(_)) => {
                                debug!("Pairing already in progress")
                            }
                            Err(PairingError::Failed { reason, .. }) => {
                                debug!(%reason, "Automatic pairing failed, not retrying")
                            }
                            Err(err) => warn!(error = %err, "Automatic pairing aborted"),
                        }
                    }
                    .instrument(info_span!("app.trust_evaluator.auto_pair", device_id = %id)),
                );
                in_flight.devices.insert(handle.id(), id.clone());
            }
            _ => {}
        }
    }
}

/// Device that just became `Online` through discovery. Leaving `Paired` via
/// an explicit unpair does not count.
fn came_online(event: &DeviceEvent) -> Option<&DeviceId> {
    match event {
        DeviceEvent::StatusChanged {
            device_id,
            from,
            to: DeviceStatus::Online,
        } if *from != DeviceStatus::Paired => Some(device_id),
        DeviceEvent::DeviceAdded { device } if device.status == DeviceStatus::Online => {
            Some(&device.id)
        }
        _ => None,
    }
}
