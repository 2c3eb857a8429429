//! Discovery transports. Each one is a supervised background service that
//! feeds sightings into the shared registry.

mod backoff;
mod mqtt;
mod multicast;
mod probe;
mod pubsub;

pub use backoff::Backoff;
pub use mqtt::MqttBrokerConnector;
pub use multicast::{MulticastTransport, MulticastWorker};
pub use probe::SubnetProber;
pub use pubsub::PubSubTransport;
