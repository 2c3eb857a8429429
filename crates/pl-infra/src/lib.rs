//! # pl-infra
//!
//! File-backed adapters for the ports defined in `pl-core`.

pub mod device;
pub mod storage;
pub mod time;

pub use device::LocalDeviceIdentity;
pub use storage::JsonSnapshotStore;
pub use time::SystemClock;
