use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use super::framing::{read_json_frame, write_json_frame, FrameError};
use super::messages::{PairingAck, PairingFrame};
use pl_core::ports::{
    BackgroundService, ServiceContext, ServiceError, ServiceWorker, TransportError,
};
use pl_core::{DeviceId, DeviceRegistry, TrustState};

/// Answers pairing hellos on the service port.
///
/// Hellos are accepted unless the requester is locally `Rejected`. Bare TCP
/// connects (reachability and latency probes) are accepted and closed.
pub struct PairingResponder {
    bind_addr: SocketAddr,
    local_id: DeviceId,
    registry: Arc<DeviceRegistry>,
    exchange_timeout: Duration,
}

impl PairingResponder {
    pub fn new(
        service_port: u16,
        local_id: DeviceId,
        registry: Arc<DeviceRegistry>,
        exchange_timeout: Duration,
    ) -> Self {
        Self::with_bind_addr(
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, service_port)),
            local_id,
            registry,
            exchange_timeout,
        )
    }

    pub fn with_bind_addr(
        bind_addr: SocketAddr,
        local_id: DeviceId,
        registry: Arc<DeviceRegistry>,
        exchange_timeout: Duration,
    ) -> Self {
        Self {
            bind_addr,
            local_id,
            registry,
            exchange_timeout,
        }
    }

    pub async fn bind(&self) -> Result<Arc<ResponderWorker>, TransportError> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|source| TransportError::Bind {
                address: self.bind_addr.to_string(),
                source,
            })?;
        info!(address = %self.bind_addr, "pairing responder listening");
        Ok(Arc::new(ResponderWorker {
            listener,
            local_id: self.local_id.clone(),
            registry: self.registry.clone(),
            exchange_timeout: self.exchange_timeout,
        }))
    }
}

#[async_trait]
impl BackgroundService for PairingResponder {
    fn name(&self) -> &'static str {
        "pairing_responder"
    }

    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError> {
        Ok(self.bind().await?)
    }
}

pub struct ResponderWorker {
    listener: TcpListener,
    local_id: DeviceId,
    registry: Arc<DeviceRegistry>,
    exchange_timeout: Duration,
}

impl ResponderWorker {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn handle(
        stream: TcpStream,
        local_id: DeviceId,
        registry: Arc<DeviceRegistry>,
    ) -> Result<(), FrameError> {
        let mut stream = stream;
        let Some(frame) = read_json_frame::<_, PairingFrame>(&mut stream).await? else {
            return Ok(());
        };
        let PairingFrame::Hello(hello) = frame else {
            debug!("ignoring non-hello frame");
            return Ok(());
        };

        let rejected = registry
            .get(&hello.device_id)
            .await
            .is_some_and(|r| r.trust == TrustState::Rejected);
        let ack = PairingAck {
            device_id: local_id,
            nonce: hello.nonce,
            accepted: !rejected,
            reason: rejected.then(|| "requester is rejected locally".to_string()),
        };
        info!(
            requester = %hello.device_id,
            name = %hello.name,
            accepted = ack.accepted,
            "answered pairing hello"
        );
        write_json_frame(&mut stream, &PairingFrame::Ack(ack)).await
    }
}

#[async_trait]
impl ServiceWorker for ResponderWorker {
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        let mut connections = JoinSet::new();
        async {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return Ok::<(), ServiceError>(()),
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    accepted = self.listener.accept() => {
                        let (stream, peer) = accepted.map_err(TransportError::Io)?;
                        let local_id = self.local_id.clone();
                        let registry = self.registry.clone();
                        let timeout = self.exchange_timeout;
                        connections.spawn(async move {
                            match tokio::time::timeout(timeout, Self::handle(stream, local_id, registry)).await {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => debug!(%peer, error = %e, "pairing exchange failed"),
                                Err(_) => warn!(%peer, "pairing exchange timed out"),
                            }
                        });
                    }
                }
            }
        }
        .instrument(info_span!("platform.pairing.responder"))
        .await
    }
}
