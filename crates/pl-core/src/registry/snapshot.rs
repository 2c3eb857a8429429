use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceRecord;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted form of the registry, handed to the snapshot store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub devices: Vec<DeviceRecord>,
}

impl RegistrySnapshot {
    pub fn new(saved_at: DateTime<Utc>, devices: Vec<DeviceRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at,
            devices,
        }
    }
}
