//! # pl-core
//!
//! Core domain models, the device registry and the ports of the PeerLink
//! discovery and pairing subsystem.
//!
//! This crate has no sockets and no files; adapters live in `pl-platform`
//! and `pl-infra`.

pub mod config;
pub mod device;
pub mod events;
pub mod ids;
pub mod network;
pub mod pairing;
pub mod ports;
pub mod registry;

pub use config::DiscoveryConfig;
pub use device::{DeviceRecord, DeviceStatus, DeviceType, Endpoint, LocalDevice, Sighting, TransportKind, TrustState};
pub use events::DeviceEvent;
pub use ids::DeviceId;
pub use pairing::{AutoPairPolicy, PairingFailureReason, PairingOutcome, PairingToken};
pub use registry::{DeviceRegistry, MergeOutcome, RegistryError, RegistrySnapshot};
