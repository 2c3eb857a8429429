//! Discovery lifecycle.
//!
//! [`DiscoveryCoordinator`] is the only component that depends on everything:
//! it owns the registry handle, the resource lease and the set of background
//! services, and it exposes the API the UI layer consumes.

mod state;
mod supervisor;

pub use state::DiscoveryState;

use pl_core::pairing::PairingToken;
use pl_core::ports::{BackgroundService, ClockPort, CycleSignal, ResourceLeasePort, ServiceContext};
use pl_core::{
    AutoPairPolicy, DeviceEvent, DeviceId, DeviceRecord, DeviceRegistry, DiscoveryConfig,
    RegistryError,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use self::supervisor::{heartbeat, supervise, TaskCounter};
use super::{PairDevice, QualityMonitor, SnapshotSaver, StaleExpiry, TrustEvaluator};
use crate::deps::DiscoveryCoordinatorDeps;
use crate::errors::{DiscoveryError, PairingError};
use crate::lease_guard::LeaseGuard;
use crate::subscription::Subscription;

const CYCLE_CHANNEL_CAPACITY: usize = 16;

/// Everything that exists only while discovery is `Running`.
struct RunningSession {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    lease: LeaseGuard,
}

pub struct DiscoveryCoordinator {
    config: DiscoveryConfig,
    registry: Arc<DeviceRegistry>,
    /// Coordinator-owned monitors first, then the transports.
    services: Vec<Arc<dyn BackgroundService>>,
    pairing: Arc<PairDevice>,
    snapshots: SnapshotSaver,
    lease: Arc<dyn ResourceLeasePort>,
    clock: Arc<dyn ClockPort>,
    cycles: broadcast::Sender<CycleSignal>,
    state: watch::Sender<DiscoveryState>,
    /// Also serializes start and stop.
    session: Mutex<Option<RunningSession>>,
    tasks: TaskCounter,
}

impl DiscoveryCoordinator {
    /// Construct a coordinator from its dependency bundle.
    pub fn from_deps(deps: DiscoveryCoordinatorDeps) -> Self {
        let DiscoveryCoordinatorDeps {
            config,
            registry,
            transports,
            handshake,
            latency,
            snapshots,
            lease,
            clock,
        } = deps;

        let pairing = Arc::new(PairDevice::new(
            registry.clone(),
            handshake,
            config.trust.handshake_timeout(),
        ));
        let snapshots = SnapshotSaver::new(
            registry.clone(),
            snapshots,
            clock.clone(),
            config.storage.save_interval(),
        );

        let mut services: Vec<Arc<dyn BackgroundService>> = vec![
            Arc::new(TrustEvaluator::new(
                registry.clone(),
                pairing.clone(),
                AutoPairPolicy::from_config(&config.trust),
                config.trust.auto_pair,
            )),
            Arc::new(QualityMonitor::new(registry.clone(), latency, &config.quality)),
            Arc::new(StaleExpiry::new(registry.clone(), clock.clone())),
            Arc::new(snapshots.clone()),
        ];
        services.extend(transports);

        let (cycles, _) = broadcast::channel(CYCLE_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(DiscoveryState::Stopped);

        Self {
            config,
            registry,
            services,
            pairing,
            snapshots,
            lease,
            clock,
            cycles,
            state,
            session: Mutex::new(None),
            tasks: TaskCounter::default(),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<DiscoveryState> {
        self.state.subscribe()
    }

    /// Background tasks (service supervisors and the heartbeat) currently alive.
    pub fn active_task_count(&self) -> usize {
        self.tasks.get()
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Acquire the resource lease, restore the last snapshot, prepare every
    /// service and start them under supervision.
    ///
    /// Fails with [`DiscoveryError::Startup`] only when a required service
    /// cannot bind; optional services that fail are skipped with a warning.
    #[tracing::instrument(name = "usecase.discovery.start", skip(self))]
    pub async fn start_discovery(&self) -> Result<(), DiscoveryError> {
        let mut session = self.session.lock().await;
        let state = self.state();
        if state != DiscoveryState::Stopped {
            return Err(DiscoveryError::InvalidState {
                operation: "start discovery",
                state,
            });
        }

        self.set_state(DiscoveryState::Starting);
        let reset = ResetOnDrop::new(&self.state);
        match self.open_session().await {
            Ok(running) => {
                *session = Some(running);
                reset.disarm();
                self.set_state(DiscoveryState::Running);
                info!(tasks = self.active_task_count(), "Discovery running");
                Ok(())
            }
            Err(err) => {
                self.set_state(DiscoveryState::Stopped);
                error!(error = %err, "Discovery failed to start");
                Err(err)
            }
        }
    }

    async fn open_session(&self) -> Result<RunningSession, DiscoveryError> {
        let lease = LeaseGuard::acquire(self.lease.clone())?;
        self.snapshots.restore().await;

        let mut workers = Vec::with_capacity(self.services.len());
        for service in &self.services {
            match service.prepare().await {
                Ok(worker) => workers.push((service.name(), worker)),
                Err(source) if service.required() => {
                    // Prepared workers and the lease are dropped on return.
                    return Err(DiscoveryError::Startup {
                        service: service.name(),
                        source,
                    });
                }
                Err(err) => {
                    warn!(
                        service = service.name(),
                        error = %err,
                        "Service unavailable, continuing without it"
                    );
                }
            }
        }

        let cancel = CancellationToken::new();
        let ctx = ServiceContext::new(cancel.clone(), self.cycles.clone());
        let restart_delay = self.config.lifecycle.restart_delay();
        let mut tasks = JoinSet::new();
        for (name, worker) in workers {
            debug!(service = name, "Starting service");
            tasks.spawn(supervise(
                name,
                worker,
                ctx.clone(),
                restart_delay,
                self.tasks.track(),
            ));
        }
        tasks.spawn(heartbeat(
            self.cycles.clone(),
            cancel.clone(),
            self.config.discovery.broadcast_interval(),
            self.tasks.track(),
        ));

        Ok(RunningSession {
            cancel,
            tasks,
            lease,
        })
    }

    /// Cancel every service, wait up to the shutdown grace period, abort
    /// stragglers, save a final snapshot and release the lease. Stopping an
    /// already stopped coordinator is a no-op.
    #[tracing::instrument(name = "usecase.discovery.stop", skip(self))]
    pub async fn stop_discovery(&self) -> Result<(), DiscoveryError> {
        let mut session = self.session.lock().await;
        let Some(running) = session.take() else {
            debug!("Discovery already stopped");
            return Ok(());
        };
        // Declared before the session parts so a dropped stop releases the
        // lease and aborts the tasks before the state returns to `Stopped`.
        let _reset = ResetOnDrop::new(&self.state);
        let RunningSession {
            cancel,
            mut tasks,
            lease,
        } = running;

        self.set_state(DiscoveryState::Stopping);
        cancel.cancel();

        let grace = self.config.lifecycle.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    warn!(error = %err, "Service task ended abnormally");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                grace_secs = grace.as_secs(),
                "Services ignored cancellation, aborting"
            );
        }
        tasks.shutdown().await;

        if let Err(err) = self.snapshots.save_once().await {
            warn!(error = %err, "Failed to save registry snapshot on stop");
        }

        lease.release();
        self.set_state(DiscoveryState::Stopped);
        info!("Discovery stopped");
        Ok(())
    }

    /// Force one passive and active cycle outside the regular schedule.
    pub fn scan_now(&self) -> Result<(), DiscoveryError> {
        if self.state() != DiscoveryState::Running {
            return Err(DiscoveryError::NotRunning);
        }
        let receivers = self.cycles.send(CycleSignal::ScanNow).unwrap_or(0);
        info!(receivers, "Forced discovery cycle requested");
        Ok(())
    }

    /// Explicit, user-initiated pairing. This is the only way a `Rejected`
    /// device is tried again.
    pub async fn pair(&self, id: &DeviceId) -> Result<DeviceRecord, PairingError> {
        self.pairing.execute(id, None).await
    }

    /// Pair through an out-of-band token (`peerlink://pair/...`). The token's
    /// signature is handed to the handshake for verification.
    pub async fn pair_with_token(&self, raw: &str) -> Result<DeviceRecord, PairingError> {
        let max_skew = chrono::Duration::seconds(
            self.config.registry.max_clock_skew_secs.min(86_400) as i64,
        );
        let token = PairingToken::parse(raw, self.clock.now(), max_skew)?;
        self.pairing
            .execute(&token.device_id, Some(token.signature))
            .await
    }

    /// Clear trust and leave `Paired`. The record stays in the registry.
    pub async fn unpair(&self, id: &DeviceId) -> Result<DeviceRecord, RegistryError> {
        let record = self.registry.unpair(id).await?;
        info!(device_id = %id, "Device unpaired");
        Ok(record)
    }

    pub async fn forget(&self, id: &DeviceId) -> Result<DeviceRecord, RegistryError> {
        let record = self.registry.forget(id).await?;
        info!(device_id = %id, "Device forgotten");
        Ok(record)
    }

    pub async fn get_devices(&self) -> Vec<DeviceRecord> {
        self.registry.list().await
    }

    pub async fn get_device(&self, id: &DeviceId) -> Option<DeviceRecord> {
        self.registry.get(id).await
    }

    /// Deliver every device event to `callback` until the returned handle is
    /// dropped or unsubscribed. Must be called inside a Tokio runtime.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(DeviceEvent) + Send + Sync + 'static,
    {
        Subscription::spawn(self.registry.subscribe(), callback)
    }

    fn set_state(&self, next: DiscoveryState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Discovery state changed");
        }
    }
}

/// Returns the coordinator to `Stopped` when a start or stop future is
/// dropped part way through.
struct ResetOnDrop<'a> {
    state: &'a watch::Sender<DiscoveryState>,
    armed: bool,
}

impl<'a> ResetOnDrop<'a> {
    fn new(state: &'a watch::Sender<DiscoveryState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let previous = self.state.send_replace(DiscoveryState::Stopped);
        if previous != DiscoveryState::Stopped {
            warn!(from = %previous, "Discovery lifecycle call interrupted, state reset");
        }
    }
}

impl Drop for DiscoveryCoordinator {
    fn drop(&mut self) {
        // Dropping the session aborts its tasks and releases the lease.
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}
