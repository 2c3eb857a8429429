use serde::Serialize;

use crate::device::{DeviceRecord, DeviceStatus, TransportKind, TrustState};
use crate::ids::DeviceId;
use crate::pairing::PairingOutcome;

/// Change notification emitted by the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    SightingReceived {
        device_id: DeviceId,
        transport: TransportKind,
    },
    DeviceAdded {
        device: DeviceRecord,
    },
    StatusChanged {
        device_id: DeviceId,
        from: DeviceStatus,
        to: DeviceStatus,
    },
    TrustChanged {
        device_id: DeviceId,
        from: TrustState,
        to: TrustState,
    },
    QualityChanged {
        device_id: DeviceId,
        score: f64,
    },
    PairingResult {
        device_id: DeviceId,
        outcome: PairingOutcome,
    },
    DeviceForgotten {
        device_id: DeviceId,
    },
}

impl DeviceEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            DeviceEvent::SightingReceived { device_id, .. }
            | DeviceEvent::StatusChanged { device_id, .. }
            | DeviceEvent::TrustChanged { device_id, .. }
            | DeviceEvent::QualityChanged { device_id, .. }
            | DeviceEvent::PairingResult { device_id, .. }
            | DeviceEvent::DeviceForgotten { device_id } => device_id,
            DeviceEvent::DeviceAdded { device } => &device.id,
        }
    }
}
