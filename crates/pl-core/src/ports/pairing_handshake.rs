use async_trait::async_trait;
use std::net::SocketAddr;

use super::HandshakeError;
use crate::ids::DeviceId;
use crate::pairing::PairingFailureReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub peer_id: DeviceId,
    pub endpoint: SocketAddr,
    /// Signature carried by an out-of-band pairing token, if any.
    pub token_signature: Option<String>,
}

/// Runs the pairing handshake with one peer. Key exchange lives behind this
/// port; callers only see success or a failure reason.
#[async_trait]
pub trait PairingHandshakePort: Send + Sync {
    async fn handshake(&self, request: HandshakeRequest) -> Result<(), HandshakeError>;
}

impl From<HandshakeError> for PairingFailureReason {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Timeout => PairingFailureReason::Timeout,
            HandshakeError::Rejected(reason) => PairingFailureReason::Rejected(reason),
            HandshakeError::Protocol(reason) | HandshakeError::Io(reason) => {
                PairingFailureReason::HandshakeError(reason)
            }
        }
    }
}
