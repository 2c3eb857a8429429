use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info_span, Instrument};

use super::framing::{read_json_frame, write_json_frame, FrameError};
use super::messages::{PairingFrame, PairingHello};
use pl_core::ports::{HandshakeError, HandshakeRequest, PairingHandshakePort};
use pl_core::LocalDevice;

/// Client side of the pairing handshake.
///
/// Succeeds iff the peer answers with an accepted ack that echoes our nonce
/// and carries the device id we expected to reach.
pub struct TcpPairingHandshake {
    local: LocalDevice,
    timeout: Duration,
}

impl TcpPairingHandshake {
    pub fn new(local: LocalDevice, timeout: Duration) -> Self {
        Self { local, timeout }
    }

    async fn exchange(&self, request: &HandshakeRequest) -> Result<(), HandshakeError> {
        let mut stream = TcpStream::connect(request.endpoint)
            .await
            .map_err(|e| HandshakeError::Io(e.to_string()))?;

        let nonce = uuid::Uuid::new_v4().to_string();
        let hello = PairingFrame::Hello(PairingHello {
            device_id: self.local.id.clone(),
            name: self.local.name.clone(),
            nonce: nonce.clone(),
            token_signature: request.token_signature.clone(),
        });
        write_json_frame(&mut stream, &hello).await.map_err(frame_error)?;

        let reply: PairingFrame = read_json_frame(&mut stream)
            .await
            .map_err(frame_error)?
            .ok_or_else(|| HandshakeError::Protocol("peer closed before acknowledging".into()))?;

        let PairingFrame::Ack(ack) = reply else {
            return Err(HandshakeError::Protocol("expected an ack frame".into()));
        };
        if ack.nonce != nonce {
            return Err(HandshakeError::Protocol("ack nonce mismatch".into()));
        }
        if ack.device_id != request.peer_id {
            return Err(HandshakeError::Protocol(format!(
                "ack from unexpected device {}",
                ack.device_id
            )));
        }
        if !ack.accepted {
            return Err(HandshakeError::Rejected(
                ack.reason.unwrap_or_else(|| "declined".into()),
            ));
        }
        Ok(())
    }
}

fn frame_error(err: FrameError) -> HandshakeError {
    match err {
        FrameError::Io(e) => HandshakeError::Io(e.to_string()),
        other => HandshakeError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl PairingHandshakePort for TcpPairingHandshake {
    async fn handshake(&self, request: HandshakeRequest) -> Result<(), HandshakeError> {
        let span = info_span!(
            "platform.pairing.handshake",
            peer_id = %request.peer_id,
            endpoint = %request.endpoint
        );
        async {
            let result = match tokio::time::timeout(self.timeout, self.exchange(&request)).await {
                Ok(result) => result,
                Err(_) => Err(HandshakeError::Timeout),
            };
            debug!(ok = result.is_ok(), "handshake finished");
            result
        }
        .instrument(span)
        .await
    }
}
