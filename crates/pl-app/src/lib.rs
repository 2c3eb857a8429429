//! # pl-app
//!
//! Use cases of the PeerLink discovery subsystem: the [`DiscoveryCoordinator`]
//! that owns the running session, and the background monitors it supervises
//! next to the transports.

pub mod deps;
pub mod errors;
pub mod lease_guard;
pub mod subscription;
pub mod usecases;

pub use deps::DiscoveryCoordinatorDeps;
pub use errors::{DiscoveryError, PairingError};
pub use lease_guard::LeaseGuard;
pub use subscription::Subscription;
pub use usecases::{
    DiscoveryCoordinator, DiscoveryState, PairDevice, QualityMonitor, SnapshotSaver,
    StaleExpiry, TrustEvaluator,
};
