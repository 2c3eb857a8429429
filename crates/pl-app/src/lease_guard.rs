use pl_core::ports::{LeaseError, ResourceLeasePort};
use std::sync::Arc;
use tracing::{debug, info};

/// Scoped hold on the host resource lease.
///
/// Released exactly once: by [`LeaseGuard::release`] or, failing that, on drop.
pub struct LeaseGuard {
    port: Arc<dyn ResourceLeasePort>,
    held: bool,
}

impl LeaseGuard {
    pub fn acquire(port: Arc<dyn ResourceLeasePort>) -> Result<Self, LeaseError> {
        port.acquire()?;
        info!("Resource lease acquired");
        Ok(Self { port, held: true })
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if std::mem::replace(&mut self.held, false) {
            self.port.release();
            info!("Resource lease released");
        } else {
            debug!("Resource lease already released");
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.held {
            self.release_once();
        }
    }
}
