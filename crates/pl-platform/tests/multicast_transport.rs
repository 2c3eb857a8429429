mod common;

use common::{eventually, WallClock};
use pl_core::network::PresencePayload;
use pl_core::ports::{
    BackgroundService, CycleSignal, ServiceContext, ServiceError, ServiceWorker, TransportError,
};
use pl_core::{DeviceId, DeviceRegistry, DeviceStatus, DiscoveryConfig, TransportKind};
use pl_platform::discovery::MulticastWorker;
use pl_platform::MulticastTransport;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

fn free_udp_port() -> u16 {
    UdpSocket::bind("0.0.0.0:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config_on(port: u16) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::default();
    config.multicast.port = port;
    config.multicast.reuse_address = true;
    config.multicast.receive_timeout_secs = 1;
    config
}

fn transport(config: &DiscoveryConfig, id: &str) -> (MulticastTransport, Arc<DeviceRegistry>) {
    let registry = Arc::new(DeviceRegistry::new(Duration::from_secs(300)));
    let transport = MulticastTransport::new(
        config,
        common::local_device(id),
        registry.clone(),
        Arc::new(WallClock),
    );
    (transport, registry)
}

fn run(worker: &Arc<MulticastWorker>, ctx: &ServiceContext) -> JoinHandle<Result<(), ServiceError>> {
    let worker = worker.clone();
    let ctx = ctx.clone();
    tokio::spawn(async move { worker.run(ctx).await })
}

async fn wait_for_status(registry: &Arc<DeviceRegistry>, id: &str, status: DeviceStatus) -> bool {
    let registry = registry.clone();
    let id = DeviceId::new(id);
    eventually(Duration::from_secs(5), move || {
        let registry = registry.clone();
        let id = id.clone();
        async move { registry.get(&id).await.is_some_and(|r| r.status == status) }
    })
    .await
}

#[tokio::test]
async fn port_in_use_fails_prepare_with_bind_error() {
    let holder = UdpSocket::bind("0.0.0.0:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let mut config = DiscoveryConfig::default();
    config.multicast.port = port;
    config.multicast.reuse_address = false;
    let (transport, _) = transport(&config, "self");

    assert!(transport.required());
    let err = match transport.prepare().await {
        Ok(_) => panic!("bind on an occupied port must fail"),
        Err(e) => e,
    };
    assert!(
        matches!(err, ServiceError::Transport(TransportError::Bind { .. })),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn peers_on_the_group_see_each_other() {
    let config = config_on(free_udp_port());
    let (alpha, alpha_registry) = transport(&config, "alpha");
    let (beta, beta_registry) = transport(&config, "beta");
    let alpha = Arc::new(alpha.bind().unwrap());
    let beta = Arc::new(beta.bind().unwrap());

    let (ctx, cancel, cycles) = common::context();
    let alpha_task = run(&alpha, &ctx);
    let beta_task = run(&beta, &ctx);

    // The start-up announcement creates the record, the next cycle confirms it.
    let registry = beta_registry.clone();
    assert!(eventually(Duration::from_secs(5), move || {
        let registry = registry.clone();
        async move { registry.get(&DeviceId::new("alpha")).await.is_some() }
    })
    .await);
    cycles.send(CycleSignal::ScanNow).unwrap();
    assert!(wait_for_status(&beta_registry, "alpha", DeviceStatus::Online).await);
    assert!(wait_for_status(&alpha_registry, "beta", DeviceStatus::Online).await);

    let seen = beta_registry.get(&DeviceId::new("alpha")).await.unwrap();
    assert_eq!(seen.source, TransportKind::Multicast);
    let endpoint = seen.primary_endpoint().unwrap();
    assert_eq!(endpoint.transport, TransportKind::Multicast);
    assert_eq!(endpoint.port, 8080, "advertised service port, not the group port");

    // Each side hears its own announcements through the loop and ignores them.
    assert!(alpha_registry.get(&DeviceId::new("alpha")).await.is_none());
    assert!(beta_registry.get(&DeviceId::new("beta")).await.is_none());

    cancel.cancel();
    alpha_task.await.unwrap().unwrap();
    beta_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_own_and_portless_datagrams() {
    let mut config = config_on(free_udp_port());
    config.device.service_port = 9090;
    let (transport, registry) = transport(&config, "self");
    let worker = Arc::new(transport.bind().unwrap());
    let (ctx, cancel, _cycles) = common::context();
    let task = run(&worker, &ctx);

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let target = (Ipv4Addr::LOCALHOST, config.multicast.port);
    let now = chrono::Utc::now().to_rfc3339();
    sender.send_to(b"definitely not json", target).unwrap();
    sender.send_to(br#"{"id":"","name":"x","timestamp":"2026-01-01T00:00:00Z"}"#, target).unwrap();
    let own = PresencePayload::announce(&common::local_device("self"), chrono::Utc::now());
    sender.send_to(&own.encode().unwrap(), target).unwrap();
    let bare = format!(
        r#"{{"id":"bare","name":"bare-host","type":"laptop","capabilities":[],"timestamp":"{now}"}}"#
    );
    sender.send_to(bare.as_bytes(), target).unwrap();

    assert!(wait_for_status(&registry, "bare", DeviceStatus::Discovered).await);
    let record = registry.get(&DeviceId::new("bare")).await.unwrap();
    let endpoint = record.primary_endpoint().unwrap();
    assert_eq!(endpoint.address, std::net::IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(endpoint.port, 9090, "falls back to the configured service port");
    assert_eq!(registry.len().await, 1, "only the well-formed foreign payload is merged");

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn port_is_released_when_the_worker_stops() {
    let port = free_udp_port();
    let mut config = config_on(port);
    config.multicast.reuse_address = false;
    let (transport, _) = transport(&config, "self");

    for _ in 0..2 {
        let worker = Arc::new(transport.bind().unwrap());
        assert_eq!(worker.local_addr().unwrap().port(), port);
        let (ctx, cancel, _cycles) = common::context();
        let task = run(&worker, &ctx);

        cancel.cancel();
        task.await.unwrap().unwrap();
        drop(worker);
    }
}
