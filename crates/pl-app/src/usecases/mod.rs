mod discovery_lifecycle;
mod pair_device;
mod quality_monitor;
mod snapshot_saver;
mod stale_expiry;
mod trust_evaluator;

pub use discovery_lifecycle::{DiscoveryCoordinator, DiscoveryState};
pub use pair_device::PairDevice;
pub use quality_monitor::QualityMonitor;
pub use snapshot_saver::SnapshotSaver;
pub use stale_expiry::StaleExpiry;
pub use trust_evaluator::TrustEvaluator;
