use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mockall::mock;
use mockall::predicate::eq;
use pl_app::QualityMonitor;
use pl_core::config::QualityConfig;
use pl_core::ports::LatencyProbePort;
use pl_core::{DeviceId, DeviceRegistry, DeviceStatus, Sighting, TransportKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Latency {}

    #[async_trait]
    impl LatencyProbePort for Latency {
        async fn probe(&self, target: SocketAddr, timeout: Duration) -> Option<Duration>;
    }
}

const PEER: &str = "192.168.1.20:8080";

async fn online_registry() -> Arc<DeviceRegistry> {
    let registry = Arc::new(DeviceRegistry::new(Duration::from_secs(300)));
    for offset in 0..2 {
        registry
            .merge(Sighting {
                id: DeviceId::new("peer"),
                name: Some("Peer".into()),
                device_type: None,
                capabilities: None,
                address: PEER.parse().unwrap(),
                transport: TransportKind::Multicast,
                timestamp: Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap(),
            })
            .await;
    }
    registry
}

fn monitor(registry: Arc<DeviceRegistry>, latency: MockLatency) -> QualityMonitor {
    QualityMonitor::new(registry, Arc::new(latency), &QualityConfig::default())
}

#[tokio::test]
async fn fast_peer_raises_the_moving_average() {
    let registry = online_registry().await;
    let before = registry.get(&DeviceId::new("peer")).await.unwrap();
    assert_eq!(before.status, DeviceStatus::Online);
    assert!((before.quality_score - 0.8).abs() < 1e-9);

    let mut latency = MockLatency::new();
    latency
        .expect_probe()
        .with(eq(PEER.parse::<SocketAddr>().unwrap()), eq(Duration::from_millis(2000)))
        .times(1)
        .returning(|_, _| Some(Duration::from_millis(20)));

    assert_eq!(monitor(registry.clone(), latency).measure_once().await, 1);

    let after = registry.get(&DeviceId::new("peer")).await.unwrap();
    assert!((after.quality_score - 0.86).abs() < 1e-9, "{}", after.quality_score);
    assert_eq!(after.latency_ms, Some(20));
}

#[tokio::test]
async fn one_unreachable_probe_does_not_zero_the_score() {
    let registry = online_registry().await;
    let mut latency = MockLatency::new();
    latency.expect_probe().times(1).returning(|_, _| None);

    monitor(registry.clone(), latency).measure_once().await;

    let after = registry.get(&DeviceId::new("peer")).await.unwrap();
    assert!((after.quality_score - 0.56).abs() < 1e-9, "{}", after.quality_score);
    assert_eq!(after.latency_ms, None);
}

#[tokio::test]
async fn score_stays_in_unit_range_over_many_rounds() {
    let registry = online_registry().await;
    let mut latency = MockLatency::new();
    let mut round = 0u32;
    latency.expect_probe().times(40).returning(move |_, _| {
        round += 1;
        match round % 4 {
            0 => None,
            1 => Some(Duration::from_millis(10)),
            2 => Some(Duration::from_millis(150)),
            _ => Some(Duration::from_secs(2)),
        }
    });
    let monitor = monitor(registry.clone(), latency);

    for _ in 0..40 {
        monitor.measure_once().await;
        let score = registry.get(&DeviceId::new("peer")).await.unwrap().quality_score;
        assert!((0.0..=1.0).contains(&score), "{score}");
    }
}

#[tokio::test]
async fn devices_that_are_not_live_are_skipped() {
    let registry = Arc::new(DeviceRegistry::new(Duration::from_secs(300)));
    registry
        .merge(Sighting {
            id: DeviceId::new("quiet"),
            name: Some("Quiet".into()),
            device_type: None,
            capabilities: None,
            address: PEER.parse().unwrap(),
            transport: TransportKind::PubSub,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        })
        .await;

    // No expectation: any probe call would panic.
    let latency = MockLatency::new();
    assert_eq!(monitor(registry, latency).measure_once().await, 0);
}
