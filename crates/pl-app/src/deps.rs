//! Dependency grouping for [`DiscoveryCoordinator`](crate::DiscoveryCoordinator).
//!
//! Plain parameter bundle: no defaults, no build steps.

use pl_core::ports::{
    BackgroundService, ClockPort, LatencyProbePort, PairingHandshakePort, ResourceLeasePort,
    SnapshotStorePort,
};
use pl_core::{DeviceRegistry, DiscoveryConfig};
use std::sync::Arc;

pub struct DiscoveryCoordinatorDeps {
    pub config: DiscoveryConfig,
    pub registry: Arc<DeviceRegistry>,

    /// Transports and any other adapter-side services (multicast, pub/sub,
    /// subnet prober, pairing responder). The coordinator adds its own
    /// monitors next to these.
    pub transports: Vec<Arc<dyn BackgroundService>>,

    pub handshake: Arc<dyn PairingHandshakePort>,
    pub latency: Arc<dyn LatencyProbePort>,
    pub snapshots: Arc<dyn SnapshotStorePort>,
    pub lease: Arc<dyn ResourceLeasePort>,
    pub clock: Arc<dyn ClockPort>,
}
