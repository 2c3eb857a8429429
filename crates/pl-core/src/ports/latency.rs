use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

/// One bounded reachability check. Returns the connect round-trip time, or
/// `None` when the target did not answer within `timeout`.
#[async_trait]
pub trait LatencyProbePort: Send + Sync {
    async fn probe(&self, target: SocketAddr, timeout: Duration) -> Option<Duration>;
}
