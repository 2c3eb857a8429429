//! Dependency injection for the daemon.
//!
//! Builds the concrete adapters from `pl-platform` / `pl-infra`, hands them to
//! the coordinator as port trait objects, and nothing else. No business
//! logic lives here.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use pl_app::{DiscoveryCoordinator, DiscoveryCoordinatorDeps};
use pl_core::ports::{BackgroundService, ClockPort, DeviceIdentityPort, LatencyProbePort};
use pl_core::{DeviceId, DeviceRegistry, DiscoveryConfig, LocalDevice};
use pl_infra::{JsonSnapshotStore, LocalDeviceIdentity, SystemClock};
use pl_platform::net_utils::get_physical_lan_ip;
use pl_platform::{
    MqttBrokerConnector, MulticastTransport, PairingResponder, ProcessLease, PubSubTransport,
    SubnetProber, TcpLatencyProbe, TcpPairingHandshake,
};

use super::paths::resolve_in;

const FALLBACK_DEVICE_NAME: &str = "peerlink-device";

pub struct Wired {
    pub coordinator: DiscoveryCoordinator,
    pub local: LocalDevice,
}

pub fn wire(config: DiscoveryConfig, data_dir: &Path) -> anyhow::Result<Wired> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

    let identity = LocalDeviceIdentity::load_or_create(data_dir)
        .context("Failed to load or create the device identity")?;
    let local = local_device(
        &config,
        identity.current_device_id(),
        &host_name(),
        get_physical_lan_ip().map(IpAddr::V4),
    );

    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock);
    let registry = Arc::new(DeviceRegistry::new(config.registry.ttl()));
    let latency: Arc<dyn LatencyProbePort> = Arc::new(TcpLatencyProbe);

    let mut transports: Vec<Arc<dyn BackgroundService>> = Vec::new();
    if config.multicast.enabled {
        transports.push(Arc::new(MulticastTransport::new(
            &config,
            local.clone(),
            registry.clone(),
            clock.clone(),
        )));
    }
    if config.pubsub.enabled {
        let connector = Arc::new(MqttBrokerConnector::new(&config.pubsub));
        transports.push(Arc::new(PubSubTransport::new(
            &config,
            local.clone(),
            registry.clone(),
            clock.clone(),
            connector,
        )));
    }
    if config.probe.enabled {
        transports.push(Arc::new(SubnetProber::new(
            &config,
            registry.clone(),
            clock.clone(),
            latency.clone(),
        )));
    }
    transports.push(Arc::new(PairingResponder::new(
        local.service_port,
        local.id.clone(),
        registry.clone(),
        config.trust.handshake_timeout(),
    )));

    let snapshot_path = resolve_in(data_dir, &config.storage.snapshot_path);
    info!(
        transports = transports.len(),
        snapshot = %snapshot_path.display(),
        "Wiring discovery coordinator"
    );

    let handshake = Arc::new(TcpPairingHandshake::new(
        local.clone(),
        config.trust.handshake_timeout(),
    ));

    let coordinator = DiscoveryCoordinator::from_deps(DiscoveryCoordinatorDeps {
        config,
        registry,
        transports,
        handshake,
        latency,
        snapshots: Arc::new(JsonSnapshotStore::new(snapshot_path)),
        lease: Arc::new(ProcessLease::new()),
        clock,
    });

    Ok(Wired { coordinator, local })
}

fn host_name() -> String {
    gethostname::gethostname()
        .to_str()
        .unwrap_or(FALLBACK_DEVICE_NAME)
        .to_string()
}

fn local_device(
    config: &DiscoveryConfig,
    id: DeviceId,
    host_name: &str,
    host: Option<IpAddr>,
) -> LocalDevice {
    let name = match config.device.name.trim() {
        "" if host_name.trim().is_empty() => FALLBACK_DEVICE_NAME.to_string(),
        "" => host_name.trim().to_string(),
        name => name.to_string(),
    };
    LocalDevice {
        id,
        name,
        device_type: config.device.device_type,
        capabilities: config
            .device
            .capabilities
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>(),
        service_port: config.device.service_port,
        host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn empty_name_falls_back_to_host_name() {
        let config = DiscoveryConfig::default();
        let local = local_device(&config, DeviceId::new("a"), "workbench", None);
        assert_eq!(local.name, "workbench");

        let local = local_device(&config, DeviceId::new("a"), "  ", None);
        assert_eq!(local.name, FALLBACK_DEVICE_NAME);
    }

    #[test]
    fn configured_values_are_announced() {
        let mut config = DiscoveryConfig::default();
        config.device.name = "Studio".into();
        config.device.service_port = 9000;
        config.device.capabilities = vec!["file_transfer".into(), "file_transfer".into()];
        let host = Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)));

        let local = local_device(&config, DeviceId::new("a"), "workbench", host);

        assert_eq!(local.name, "Studio");
        assert_eq!(local.service_port, 9000);
        assert_eq!(local.capabilities.len(), 1);
        assert_eq!(local.host, host);
    }

    #[test]
    fn wire_creates_identity_in_data_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = DiscoveryConfig::default();
        config.multicast.enabled = false;
        config.pubsub.enabled = false;
        config.probe.enabled = false;

        let wired = wire(config, dir.path()).unwrap();

        assert!(dir.path().join("device_id.txt").exists());
        assert_eq!(wired.coordinator.active_task_count(), 0);
    }
}
