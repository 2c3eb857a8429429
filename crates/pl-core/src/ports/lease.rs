use super::LeaseError;

/// Host resource that keeps background timers alive while discovery runs
/// (a wake lock, a power assertion, an inhibitor).
///
/// Only the coordinator touches this, and always through a guard.
pub trait ResourceLeasePort: Send + Sync {
    fn acquire(&self) -> Result<(), LeaseError>;

    fn release(&self);
}
