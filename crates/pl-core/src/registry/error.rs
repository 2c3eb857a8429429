use thiserror::Error;

use crate::device::{DeviceStatus, TrustState};
use crate::ids::DeviceId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    #[error("device {device_id}: status {from} -> {to} is not allowed")]
    InvalidTransition {
        device_id: DeviceId,
        from: DeviceStatus,
        to: DeviceStatus,
    },

    #[error("device {device_id}: trust {from} -> {to} is not allowed")]
    InvalidTrustTransition {
        device_id: DeviceId,
        from: TrustState,
        to: TrustState,
    },
}
