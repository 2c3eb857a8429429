use async_trait::async_trait;
use std::sync::Arc;

use super::BrokerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Command half of a broker connection. Cheap to share across tasks.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError>;

    async fn disconnect(&self) -> Result<(), BrokerError>;
}

/// Inbound half of a broker connection. An error means the connection is
/// gone and the session must be re-established.
#[async_trait]
pub trait BrokerMessageStream: Send {
    async fn next_message(&mut self) -> Result<BrokerMessage, BrokerError>;
}

pub struct BrokerSession {
    pub client: Arc<dyn BrokerClient>,
    pub messages: Box<dyn BrokerMessageStream>,
}

#[async_trait]
pub trait BrokerConnectorPort: Send + Sync {
    /// Connect and wait for the broker to acknowledge the session.
    async fn connect(&self, client_id: &str) -> Result<BrokerSession, BrokerError>;
}
