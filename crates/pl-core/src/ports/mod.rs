//! Port interfaces
//!
//! Ports are the contracts between the use cases in `pl-app` and the adapters
//! in `pl-platform` / `pl-infra`. Core code only ever sees these traits.

mod broker;
mod clock;
pub mod device_identity;
pub mod errors;
mod latency;
mod lease;
mod pairing_handshake;
pub mod service;
mod snapshot_store;

pub use broker::{BrokerClient, BrokerConnectorPort, BrokerMessage, BrokerMessageStream, BrokerSession};
pub use clock::*;
pub use device_identity::DeviceIdentityPort;
pub use errors::{BrokerError, HandshakeError, LeaseError, StorageError, TransportError};
pub use latency::LatencyProbePort;
pub use lease::ResourceLeasePort;
pub use pairing_handshake::{HandshakeRequest, PairingHandshakePort};
pub use service::{BackgroundService, CycleSignal, ServiceContext, ServiceError, ServiceWorker};
pub use snapshot_store::SnapshotStorePort;
