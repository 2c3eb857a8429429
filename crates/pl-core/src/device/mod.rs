//! Device domain models.

pub mod endpoint;
pub mod kind;
pub mod local;
pub mod record;
pub mod sighting;
pub mod status;

pub use endpoint::{Endpoint, TransportKind};
pub use kind::DeviceType;
pub use local::LocalDevice;
pub use record::DeviceRecord;
pub use sighting::Sighting;
pub use status::{DeviceStatus, TrustState};
