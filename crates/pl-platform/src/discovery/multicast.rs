//! UDP multicast presence: a broadcaster driven by the shared heartbeat and a
//! listener with a bounded receive timeout.

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use pl_core::config::DiscoveryConfig;
use pl_core::network::PresencePayload;
use pl_core::ports::{
    BackgroundService, ClockPort, ServiceContext, ServiceError, ServiceWorker, TransportError,
};
use pl_core::{DeviceRegistry, LocalDevice, TransportKind};

/// Largest datagram we accept; presence payloads are far smaller.
const MAX_DATAGRAM_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone)]
struct MulticastSettings {
    group: Ipv4Addr,
    port: u16,
    required: bool,
    reuse_address: bool,
    receive_timeout: Duration,
    max_clock_skew: Duration,
    /// Service port for payloads that do not advertise one. The datagram's
    /// source port is the sender's multicast port, never its service port.
    default_port: u16,
}

pub struct MulticastTransport {
    settings: MulticastSettings,
    local: LocalDevice,
    registry: Arc<DeviceRegistry>,
    clock: Arc<dyn ClockPort>,
}

impl MulticastTransport {
    pub fn new(
        config: &DiscoveryConfig,
        local: LocalDevice,
        registry: Arc<DeviceRegistry>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            settings: MulticastSettings {
                group: config.multicast.group,
                port: config.multicast.port,
                required: config.multicast.required,
                reuse_address: config.multicast.reuse_address,
                receive_timeout: config.multicast.receive_timeout(),
                max_clock_skew: config.registry.max_clock_skew(),
                default_port: config.device.service_port,
            },
            local,
            registry,
            clock,
        }
    }

    /// Bind the group port and join the group. A port held by another process
    /// fails here unless `reuse_address` is set.
    pub fn bind(&self) -> Result<MulticastWorker, TransportError> {
        let socket = bind_multicast_socket(&self.settings)?;
        info!(
            group = %self.settings.group,
            port = self.settings.port,
            "multicast transport bound"
        );
        Ok(MulticastWorker {
            socket,
            settings: self.settings.clone(),
            local: self.local.clone(),
            registry: self.registry.clone(),
            clock: self.clock.clone(),
        })
    }
}

fn bind_multicast_socket(settings: &MulticastSettings) -> Result<UdpSocket, TransportError> {
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, settings.port);
    let bind_error = |source: std::io::Error| TransportError::Bind {
        address: bind_addr.to_string(),
        source,
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_error)?;
    if settings.reuse_address {
        socket.set_reuse_address(true).map_err(bind_error)?;
    }
    socket.bind(&SocketAddr::V4(bind_addr).into()).map_err(bind_error)?;
    socket
        .join_multicast_v4(&settings.group, &Ipv4Addr::UNSPECIFIED)
        .map_err(bind_error)?;
    socket.set_multicast_loop_v4(true).map_err(bind_error)?;
    let _ = socket.set_multicast_ttl_v4(1);
    socket.set_nonblocking(true).map_err(bind_error)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(bind_error)
}

#[async_trait]
impl BackgroundService for MulticastTransport {
    fn name(&self) -> &'static str {
        "multicast"
    }

    fn required(&self) -> bool {
        self.settings.required
    }

    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError> {
        Ok(Arc::new(self.bind()?))
    }
}

/// Owns the bound socket for as long as discovery runs; dropping the worker
/// closes it.
pub struct MulticastWorker {
    socket: UdpSocket,
    settings: MulticastSettings,
    local: LocalDevice,
    registry: Arc<DeviceRegistry>,
    clock: Arc<dyn ClockPort>,
}

impl MulticastWorker {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn announce(&self) {
        let payload = PresencePayload::announce(&self.local, self.clock.now());
        let bytes = match payload.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode presence payload");
                return;
            }
        };
        let target = SocketAddrV4::new(self.settings.group, self.settings.port);
        // Fire and forget; the next heartbeat repeats it.
        match self.socket.send_to(&bytes, target).await {
            Ok(_) => trace!(%target, "presence broadcast sent"),
            Err(e) => debug!(%target, error = %e, "presence broadcast failed"),
        }
    }

    async fn broadcast_loop(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        let mut cycles = ctx.cycles();
        self.announce().await;
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                signal = cycles.recv() => match signal {
                    Ok(_) => self.announce().await,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "broadcaster lagged behind the heartbeat");
                        self.announce().await;
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
            }
        }
    }

    async fn listen_loop(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        loop {
            let received = tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                r = tokio::time::timeout(self.settings.receive_timeout, self.socket.recv_from(&mut buf)) => r,
            };
            match received {
                // Receive timeout: loop around and look at the cancel token again.
                Err(_) => continue,
                Ok(Err(e)) => return Err(TransportError::Io(e).into()),
                Ok(Ok((len, source))) => self.handle_datagram(&buf[..len], source).await,
            }
        }
    }

    async fn handle_datagram(&self, bytes: &[u8], source: SocketAddr) {
        let payload = match PresencePayload::parse(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(%source, error = %e, "dropping malformed multicast datagram");
                return;
            }
        };
        if payload.id == self.local.id {
            return;
        }
        let sighting = match payload.into_sighting(
            TransportKind::Multicast,
            Some(source.ip()),
            self.settings.default_port,
            self.clock.now(),
            self.settings.max_clock_skew,
        ) {
            Ok(sighting) => sighting,
            Err(e) => {
                debug!(%source, error = %e, "dropping multicast presence");
                return;
            }
        };
        let outcome = self.registry.merge(sighting).await;
        trace!(device_id = %outcome.device_id, created = outcome.created, "multicast sighting merged");
    }
}

#[async_trait]
impl ServiceWorker for MulticastWorker {
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        let broadcaster = self
            .broadcast_loop(ctx.clone())
            .instrument(info_span!("platform.multicast.broadcaster"));
        let listener = self
            .listen_loop(ctx.clone())
            .instrument(info_span!("platform.multicast.listener"));
        tokio::try_join!(broadcaster, listener)?;
        Ok(())
    }
}
