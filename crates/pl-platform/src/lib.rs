//! # pl-platform
//!
//! Adapters that touch the network: discovery transports, the latency probe,
//! the pairing handshake and the process resource lease.

pub mod discovery;
pub mod latency;
pub mod lease;
pub mod net_utils;
pub mod pairing_stream;

pub use discovery::{MqttBrokerConnector, MulticastTransport, PubSubTransport, SubnetProber};
pub use latency::TcpLatencyProbe;
pub use lease::ProcessLease;
pub use pairing_stream::{PairingResponder, TcpPairingHandshake};
