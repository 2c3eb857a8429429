#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pl_app::DiscoveryCoordinatorDeps;
use pl_core::ports::{
    BackgroundService, ClockPort, CycleSignal, HandshakeError, HandshakeRequest, LatencyProbePort,
    LeaseError, PairingHandshakePort, ResourceLeasePort, ServiceContext, ServiceError,
    ServiceWorker, SnapshotStorePort, StorageError, TransportError,
};
use pl_core::{DeviceId, DeviceRegistry, DiscoveryConfig, RegistrySnapshot, Sighting, TransportKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Wall clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(base_time()),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl ClockPort for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
pub struct CountingLease {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl CountingLease {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl ResourceLeasePort for CountingLease {
    fn acquire(&self) -> Result<(), LeaseError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    pub saved: Mutex<Option<RegistrySnapshot>>,
    pub saves: AtomicUsize,
}

#[async_trait]
impl SnapshotStorePort for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<RegistrySnapshot>, StorageError> {
        Ok(self.saved.lock().unwrap().clone())
    }

    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StorageError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.saved.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }
}

pub struct Unreachable;

#[async_trait]
impl LatencyProbePort for Unreachable {
    async fn probe(&self, _target: SocketAddr, _timeout: Duration) -> Option<Duration> {
        None
    }
}

/// Handshake double with a scripted answer and a call log.
pub struct ScriptedHandshake {
    answer: Mutex<Box<dyn FnMut() -> Result<(), HandshakeError> + Send>>,
    pub requests: Mutex<Vec<HandshakeRequest>>,
}

impl ScriptedHandshake {
    pub fn accepting() -> Arc<Self> {
        Self::answering(|| Ok(()))
    }

    pub fn rejecting() -> Arc<Self> {
        Self::answering(|| Err(HandshakeError::Rejected("declined".into())))
    }

    pub fn answering(answer: impl FnMut() -> Result<(), HandshakeError> + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Box::new(answer)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PairingHandshakePort for ScriptedHandshake {
    async fn handshake(&self, request: HandshakeRequest) -> Result<(), HandshakeError> {
        self.requests.lock().unwrap().push(request);
        let mut answer = self.answer.lock().unwrap();
        (answer)()
    }
}

/// Resource counters shared by a [`FakeTransport`] and its workers.
#[derive(Default)]
pub struct TransportProbe {
    /// Bound "sockets" currently alive.
    pub open: AtomicUsize,
    pub prepares: AtomicUsize,
    pub runs: AtomicUsize,
    pub scans: AtomicUsize,
}

impl TransportProbe {
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Runs until cancelled.
    Cooperative,
    /// Never looks at the cancellation token.
    IgnoresCancel,
    /// `prepare` fails as if the port were taken.
    FailsToBind,
}

pub struct FakeTransport {
    pub name: &'static str,
    pub required: bool,
    pub behaviour: Behaviour,
    pub probe: Arc<TransportProbe>,
}

impl FakeTransport {
    pub fn new(name: &'static str, required: bool, behaviour: Behaviour) -> (Arc<Self>, Arc<TransportProbe>) {
        let probe = Arc::new(TransportProbe::default());
        (
            Arc::new(Self {
                name,
                required,
                behaviour,
                probe: probe.clone(),
            }),
            probe,
        )
    }
}

#[async_trait]
impl BackgroundService for FakeTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError> {
        self.probe.prepares.fetch_add(1, Ordering::SeqCst);
        if self.behaviour == Behaviour::FailsToBind {
            return Err(ServiceError::Transport(TransportError::Bind {
                address: "239.255.255.250:5353".into(),
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
            }));
        }
        self.probe.open.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeWorker {
            behaviour: self.behaviour,
            probe: self.probe.clone(),
        }))
    }
}

struct FakeWorker {
    behaviour: Behaviour,
    probe: Arc<TransportProbe>,
}

impl Drop for FakeWorker {
    fn drop(&mut self) {
        self.probe.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServiceWorker for FakeWorker {
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        self.probe.runs.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::IgnoresCancel => loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            },
            _ => {
                let mut cycles = ctx.cycles();
                loop {
                    tokio::select! {
                        _ = ctx.cancelled() => return Ok(()),
                        signal = cycles.recv() => {
                            if let Ok(CycleSignal::ScanNow) = signal {
                                self.probe.scans.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    }
                }
            }
        }
    }
}

pub struct Harness {
    pub registry: Arc<DeviceRegistry>,
    pub lease: Arc<CountingLease>,
    pub store: Arc<MemorySnapshotStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(DeviceRegistry::new(Duration::from_secs(300))),
            lease: Arc::new(CountingLease::default()),
            store: Arc::new(MemorySnapshotStore::default()),
            clock: ManualClock::new(),
        }
    }

    pub fn deps(
        &self,
        config: DiscoveryConfig,
        transports: Vec<Arc<dyn BackgroundService>>,
        handshake: Arc<dyn PairingHandshakePort>,
    ) -> DiscoveryCoordinatorDeps {
        DiscoveryCoordinatorDeps {
            config,
            registry: self.registry.clone(),
            transports,
            handshake,
            latency: Arc::new(Unreachable),
            snapshots: self.store.clone(),
            lease: self.lease.clone(),
            clock: self.clock.clone(),
        }
    }
}

pub fn sighting(id: &str, capabilities: &[&str], addr: &str, at: DateTime<Utc>) -> Sighting {
    Sighting {
        id: DeviceId::new(id),
        name: Some(format!("{id}-host")),
        device_type: None,
        capabilities: Some(capabilities.iter().map(|c| c.to_string()).collect()),
        address: addr.parse().unwrap(),
        transport: TransportKind::Multicast,
        timestamp: at,
    }
}

/// Poll `check` until it holds or `deadline` passes.
pub async fn eventually<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let until = tokio::time::Instant::now() + deadline;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= until {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
