use serde::{Deserialize, Serialize};

use pl_core::DeviceId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingHello {
    pub device_id: DeviceId,
    pub name: String,
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingAck {
    pub device_id: DeviceId,
    /// Echo of the hello nonce.
    pub nonce: String,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PairingFrame {
    Hello(PairingHello),
    Ack(PairingAck),
}
