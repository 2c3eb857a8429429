use thiserror::Error;

use crate::network::PayloadError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl From<PayloadError> for TransportError {
    fn from(err: PayloadError) -> Self {
        TransportError::Malformed(err.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker connect failed: {0}")]
    Connect(String),

    #[error("broker connect timed out")]
    Timeout,

    #[error("broker connection lost: {0}")]
    Disconnected(String),

    #[error("broker request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("handshake timed out")]
    Timeout,

    #[error("peer rejected pairing: {0}")]
    Rejected(String),

    #[error("handshake protocol error: {0}")]
    Protocol(String),

    #[error("handshake io error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaseError {
    #[error("resource lease unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage format error: {0}")]
    Format(String),
}
