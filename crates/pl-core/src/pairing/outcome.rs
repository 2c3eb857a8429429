use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PairingFailureReason {
    Timeout,
    Rejected(String),
    HandshakeError(String),
}

impl Display for PairingFailureReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PairingFailureReason::Timeout => f.write_str("handshake timed out"),
            PairingFailureReason::Rejected(reason) => write!(f, "rejected by peer: {reason}"),
            PairingFailureReason::HandshakeError(reason) => write!(f, "handshake error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PairingOutcome {
    Success,
    Failed { reason: PairingFailureReason },
}

impl PairingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PairingOutcome::Success)
    }
}
