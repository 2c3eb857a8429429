use pl_core::pairing::TokenError;
use pl_core::ports::{LeaseError, ServiceError};
use pl_core::{DeviceId, PairingFailureReason, RegistryError};
use thiserror::Error;

use crate::usecases::DiscoveryState;

/// Result of an explicit or automatic pairing request.
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    #[error("pairing with {0} is already in progress")]
    AlreadyPending(DeviceId),

    /// The device was only seen by the subnet prober; there is no identity
    /// to pair with yet.
    #[error("device {0} has no verified identity")]
    UnidentifiedDevice(DeviceId),

    #[error("pairing with {device_id} failed: {reason}")]
    Failed {
        device_id: DeviceId,
        reason: PairingFailureReason,
    },

    #[error("invalid pairing token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The record changed under the handshake (unpaired or forgotten).
    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for PairingError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownDevice(id) => PairingError::UnknownDevice(id),
            other => PairingError::Registry(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A required service could not acquire its listening resource.
    #[error("failed to start {service}: {source}")]
    Startup {
        service: &'static str,
        #[source]
        source: ServiceError,
    },

    #[error("cannot {operation} while discovery is {state}")]
    InvalidState {
        operation: &'static str,
        state: DiscoveryState,
    },

    #[error("discovery is not running")]
    NotRunning,

    #[error(transparent)]
    Lease(#[from] LeaseError),
}
