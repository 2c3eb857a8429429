mod common;

use common::{eventually, Behaviour, FakeTransport, Harness, ScriptedHandshake};
use pl_app::{DiscoveryCoordinator, DiscoveryError, DiscoveryState};
use pl_core::ports::BackgroundService;
use pl_core::{DeviceId, DeviceStatus, DiscoveryConfig, RegistrySnapshot, TrustState};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Trust evaluator, quality monitor, stale expiry and snapshot saver.
const MONITORS: usize = 4;
const HEARTBEAT: usize = 1;

#[tokio::test]
async fn stop_then_start_returns_resources_to_baseline() {
    let h = Harness::new();
    let (multicast, multicast_probe) = FakeTransport::new("multicast", true, Behaviour::Cooperative);
    let (pubsub, pubsub_probe) = FakeTransport::new("pubsub", false, Behaviour::Cooperative);
    let coordinator = DiscoveryCoordinator::from_deps(h.deps(
        DiscoveryConfig::default(),
        vec![multicast as Arc<dyn BackgroundService>, pubsub],
        ScriptedHandshake::accepting(),
    ));
    assert_eq!(coordinator.active_task_count(), 0);

    for round in 1..=3 {
        coordinator.start_discovery().await.unwrap();
        assert_eq!(coordinator.state(), DiscoveryState::Running);
        assert_eq!(coordinator.active_task_count(), MONITORS + 2 + HEARTBEAT);
        assert_eq!(multicast_probe.open(), 1);
        assert_eq!(pubsub_probe.open(), 1);
        assert_eq!(h.lease.acquired(), round);

        coordinator.stop_discovery().await.unwrap();
        assert_eq!(coordinator.state(), DiscoveryState::Stopped);
        assert_eq!(coordinator.active_task_count(), 0, "round {round}");
        assert_eq!(multicast_probe.open(), 0, "round {round}");
        assert_eq!(pubsub_probe.open(), 0, "round {round}");
        assert_eq!(h.lease.released(), round);
    }
}

#[tokio::test]
async fn required_bind_failure_aborts_start_and_releases_lease() {
    let h = Harness::new();
    let (pubsub, pubsub_probe) = FakeTransport::new("pubsub", false, Behaviour::Cooperative);
    let (multicast, _) = FakeTransport::new("multicast", true, Behaviour::FailsToBind);
    let coordinator = DiscoveryCoordinator::from_deps(h.deps(
        DiscoveryConfig::default(),
        vec![pubsub as Arc<dyn BackgroundService>, multicast],
        ScriptedHandshake::accepting(),
    ));

    let err = coordinator.start_discovery().await.unwrap_err();
    assert!(
        matches!(err, DiscoveryError::Startup { service: "multicast", .. }),
        "unexpected error: {err}"
    );
    assert_eq!(coordinator.state(), DiscoveryState::Stopped);
    assert_eq!(h.lease.acquired(), 1);
    assert_eq!(h.lease.released(), 1);
    assert_eq!(coordinator.active_task_count(), 0);
    assert_eq!(pubsub_probe.prepares.load(Ordering::SeqCst), 1);
    assert_eq!(pubsub_probe.open(), 0, "already prepared services are closed again");
    assert_eq!(pubsub_probe.runs(), 0);
}

#[tokio::test]
async fn optional_bind_failure_degrades_to_remaining_transports() {
    let h = Harness::new();
    let (multicast, multicast_probe) = FakeTransport::new("multicast", false, Behaviour::FailsToBind);
    let (pubsub, pubsub_probe) = FakeTransport::new("pubsub", false, Behaviour::Cooperative);
    let coordinator = DiscoveryCoordinator::from_deps(h.deps(
        DiscoveryConfig::default(),
        vec![multicast as Arc<dyn BackgroundService>, pubsub],
        ScriptedHandshake::accepting(),
    ));

    coordinator.start_discovery().await.unwrap();
    assert_eq!(coordinator.active_task_count(), MONITORS + 1 + HEARTBEAT);
    assert_eq!(multicast_probe.open(), 0);
    let probe = pubsub_probe.clone();
    assert!(eventually(Duration::from_secs(2), move || {
        let probe = probe.clone();
        async move { probe.runs() == 1 }
    })
    .await);

    coordinator.stop_discovery().await.unwrap();
    assert_eq!(h.lease.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn straggling_service_is_aborted_and_lease_released_once() {
    let h = Harness::new();
    let (stubborn, stubborn_probe) = FakeTransport::new("stubborn", false, Behaviour::IgnoresCancel);
    let mut config = DiscoveryConfig::default();
    config.lifecycle.shutdown_grace_secs = 1;
    let coordinator = DiscoveryCoordinator::from_deps(h.deps(
        config,
        vec![stubborn as Arc<dyn BackgroundService>],
        ScriptedHandshake::accepting(),
    ));

    coordinator.start_discovery().await.unwrap();
    let probe = stubborn_probe.clone();
    assert!(eventually(Duration::from_secs(1), move || {
        let probe = probe.clone();
        async move { probe.runs() == 1 }
    })
    .await);

    coordinator.stop_discovery().await.unwrap();
    assert_eq!(coordinator.state(), DiscoveryState::Stopped);
    assert_eq!(coordinator.active_task_count(), 0);
    assert_eq!(stubborn_probe.open(), 0);
    assert_eq!(h.lease.acquired(), 1);
    assert_eq!(h.lease.released(), 1);

    coordinator.stop_discovery().await.unwrap();
    assert_eq!(h.lease.released(), 1, "second stop is a no-op");
}

#[tokio::test(start_paused = true)]
async fn interrupted_stop_still_allows_a_restart() {
    let h = Harness::new();
    let (stubborn, stubborn_counters) = FakeTransport::new("stubborn", false, Behaviour::IgnoresCancel);
    let mut config = DiscoveryConfig::default();
    config.lifecycle.shutdown_grace_secs = 5;
    let coordinator = DiscoveryCoordinator::from_deps(h.deps(
        config,
        vec![stubborn as Arc<dyn BackgroundService>],
        ScriptedHandshake::accepting(),
    ));

    coordinator.start_discovery().await.unwrap();
    let counters = stubborn_counters.clone();
    assert!(eventually(Duration::from_secs(1), move || {
        let counters = counters.clone();
        async move { counters.runs() == 1 }
    })
    .await);

    let interrupted = tokio::time::timeout(Duration::from_secs(1), coordinator.stop_discovery()).await;
    assert!(interrupted.is_err(), "stop was still inside the grace period");
    assert_eq!(coordinator.state(), DiscoveryState::Stopped);
    assert_eq!(h.lease.released(), 1);

    coordinator.start_discovery().await.unwrap();
    assert_eq!(coordinator.state(), DiscoveryState::Running);
    assert_eq!(h.lease.acquired(), 2);

    coordinator.stop_discovery().await.unwrap();
    assert_eq!(coordinator.state(), DiscoveryState::Stopped);
    assert_eq!(h.lease.released(), 2);
    let coordinator = &coordinator;
    assert!(
        eventually(Duration::from_secs(1), move || async move {
            coordinator.active_task_count() == 0
        })
        .await
    );
}

#[tokio::test]
async fn start_while_running_is_rejected() {
    let h = Harness::new();
    let coordinator = DiscoveryCoordinator::from_deps(h.deps(
        DiscoveryConfig::default(),
        Vec::new(),
        ScriptedHandshake::accepting(),
    ));

    coordinator.start_discovery().await.unwrap();
    let err = coordinator.start_discovery().await.unwrap_err();
    assert!(matches!(
        err,
        DiscoveryError::InvalidState {
            state: DiscoveryState::Running,
            ..
        }
    ));
    assert_eq!(h.lease.acquired(), 1);
    coordinator.stop_discovery().await.unwrap();
}

#[tokio::test]
async fn scan_now_reaches_running_services() {
    let h = Harness::new();
    let (multicast, probe) = FakeTransport::new("multicast", true, Behaviour::Cooperative);
    let coordinator = DiscoveryCoordinator::from_deps(h.deps(
        DiscoveryConfig::default(),
        vec![multicast as Arc<dyn BackgroundService>],
        ScriptedHandshake::accepting(),
    ));

    assert!(matches!(coordinator.scan_now(), Err(DiscoveryError::NotRunning)));

    coordinator.start_discovery().await.unwrap();
    let running = probe.clone();
    assert!(eventually(Duration::from_secs(2), move || {
        let running = running.clone();
        async move { running.runs() == 1 }
    })
    .await);

    coordinator.scan_now().unwrap();
    let scanned = probe.clone();
    assert!(eventually(Duration::from_secs(2), move || {
        let scanned = scanned.clone();
        async move { scanned.scans() == 1 }
    })
    .await);

    coordinator.stop_discovery().await.unwrap();
}

#[tokio::test]
async fn snapshot_is_restored_on_start_and_saved_on_stop() {
    let h = Harness::new();
    let seed = Harness::new();
    let id = DeviceId::new("laptop");
    seed.registry
        .merge(common::sighting("laptop", &[], "192.168.1.20:8080", common::base_time()))
        .await;
    seed.registry
        .set_trust(&id, TrustState::PendingPairing)
        .await
        .unwrap();
    seed.registry.set_trust(&id, TrustState::Trusted).await.unwrap();
    *h.store.saved.lock().unwrap() = Some(RegistrySnapshot::new(
        common::base_time(),
        seed.registry.list().await,
    ));

    let coordinator = DiscoveryCoordinator::from_deps(h.deps(
        DiscoveryConfig::default(),
        Vec::new(),
        ScriptedHandshake::accepting(),
    ));
    coordinator.start_discovery().await.unwrap();

    let restored = coordinator.get_device(&id).await.unwrap();
    assert_eq!(restored.trust, TrustState::Trusted);
    assert_eq!(restored.status, DeviceStatus::Discovered);

    coordinator.stop_discovery().await.unwrap();
    let saved = h.store.saved.lock().unwrap().clone().unwrap();
    assert_eq!(saved.devices.len(), 1);
    assert_eq!(saved.devices[0].id, id);
    assert!(h.store.saves.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn dropping_a_running_coordinator_releases_the_lease() {
    let h = Harness::new();
    let coordinator = DiscoveryCoordinator::from_deps(h.deps(
        DiscoveryConfig::default(),
        Vec::new(),
        ScriptedHandshake::accepting(),
    ));
    coordinator.start_discovery().await.unwrap();
    drop(coordinator);
    assert_eq!(h.lease.released(), 1);
}
