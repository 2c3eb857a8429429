use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use pl_core::ports::{LeaseError, ResourceLeasePort};

/// Process-level lease for headless hosts.
///
/// A daemon has no platform wake lock to hold, so this only tracks ownership
/// and logs transitions. Desktop or mobile hosts plug their own power
/// assertion in through the same port.
#[derive(Debug, Default)]
pub struct ProcessLease {
    held: AtomicBool,
}

impl ProcessLease {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl ResourceLeasePort for ProcessLease {
    fn acquire(&self) -> Result<(), LeaseError> {
        if self.held.swap(true, Ordering::SeqCst) {
            return Err(LeaseError::Unavailable("lease already held".into()));
        }
        info!("resource lease acquired");
        Ok(())
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            info!("resource lease released");
        } else {
            debug!("release on a lease that was not held");
        }
    }
}
