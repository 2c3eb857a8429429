//! Local device identity.
//!
//! The id is a UUID v4 stored as plain text in the data directory. It is
//! created once and never changes for the lifetime of the installation; if it
//! cannot be loaded or created, the process must not start.

mod storage;

use anyhow::Result;
use std::path::Path;
use pl_core::ports::DeviceIdentityPort;
use pl_core::DeviceId;

pub struct LocalDeviceIdentity {
    device_id: DeviceId,
}

impl LocalDeviceIdentity {
    /// Load the persisted id, or generate and persist a new one.
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        if let Some(id) = storage::load_from_disk(data_dir)? {
            tracing::debug!(device_id = %id, "loaded device identity");
            return Ok(Self { device_id: id });
        }

        let id = DeviceId::generate();
        storage::save_to_disk(data_dir, &id)?;
        tracing::info!(device_id = %id, "created device identity");
        Ok(Self { device_id: id })
    }
}

impl DeviceIdentityPort for LocalDeviceIdentity {
    fn current_device_id(&self) -> DeviceId {
        self.device_id.clone()
    }
}
