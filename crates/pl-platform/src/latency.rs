use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::trace;

use pl_core::ports::LatencyProbePort;

/// Measures TCP connect time. Closed ports and unreachable hosts are an
/// expected outcome and only show up at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpLatencyProbe;

#[async_trait]
impl LatencyProbePort for TcpLatencyProbe {
    async fn probe(&self, target: SocketAddr, timeout: Duration) -> Option<Duration> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                let rtt = start.elapsed();
                drop(stream);
                Some(rtt)
            }
            Ok(Err(e)) => {
                trace!(%target, error = %e, "probe connect failed");
                None
            }
            Err(_) => {
                trace!(%target, "probe connect timed out");
                None
            }
        }
    }
}
