use pl_core::ports::{HandshakeRequest, PairingHandshakePort};
use pl_core::{
    DeviceId, DeviceRecord, DeviceRegistry, DeviceStatus, PairingFailureReason, PairingOutcome,
    RegistryError, TrustState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::errors::PairingError;

/// Run one pairing handshake and record its outcome.
///
/// Shared by explicit `pair` requests and the trust evaluator. The caller
/// decides whether a `Rejected` device may be tried again; this use case
/// only refuses to start a second handshake while one is pending.
pub struct PairDevice {
    registry: Arc<DeviceRegistry>,
    handshake: Arc<dyn PairingHandshakePort>,
    timeout: Duration,
}

impl PairDevice {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        handshake: Arc<dyn PairingHandshakePort>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            handshake,
            timeout,
        }
    }

    #[tracing::instrument(
        name = "usecase.pair_device.execute",
        skip(self, token_signature),
        fields(device_id = %id, with_token = token_signature.is_some())
    )]
    pub async fn execute(
        &self,
        id: &DeviceId,
        token_signature: Option<String>,
    ) -> Result<DeviceRecord, PairingError> {
        if id.is_probe_placeholder() {
            return Err(PairingError::UnidentifiedDevice(id.clone()));
        }

        let current = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| PairingError::UnknownDevice(id.clone()))?;
        if current.trust == TrustState::Trusted {
            info!("Device already trusted");
            if current.status == DeviceStatus::Online {
                return Ok(self.registry.set_status(id, DeviceStatus::Paired).await?);
            }
            return Ok(current);
        }

        let record = self
            .registry
            .begin_pairing(id)
            .await
            .map_err(|err| match err {
                RegistryError::InvalidTrustTransition {
                    from: TrustState::PendingPairing,
                    ..
                } => PairingError::AlreadyPending(id.clone()),
                other => other.into(),
            })?;
        let pending = PendingGuard::new(self.registry.clone(), id.clone());

        let outcome = match record.primary_endpoint() {
            Some(endpoint) => {
                let request = HandshakeRequest {
                    peer_id: id.clone(),
                    endpoint: endpoint.socket_addr(),
                    token_signature,
                };
                info!(endpoint = %request.endpoint, "Starting pairing handshake");
                match tokio::time::timeout(self.timeout, self.handshake.handshake(request)).await {
                    Ok(Ok(())) => PairingOutcome::Success,
                    Ok(Err(err)) => PairingOutcome::Failed { reason: err.into() },
                    Err(_) => PairingOutcome::Failed {
                        reason: PairingFailureReason::Timeout,
                    },
                }
            }
            None => PairingOutcome::Failed {
                reason: PairingFailureReason::HandshakeError("no known endpoint".into()),
            },
        };

        let recorded = self.registry.record_pairing_outcome(id, &outcome).await;
        pending.settle();
        let record = recorded?;
        match outcome {
            PairingOutcome::Success => {
                info!(status = %record.status, "Device paired");
                Ok(record)
            }
            PairingOutcome::Failed { reason } => {
                warn!(%reason, "Pairing failed, device rejected");
                Err(PairingError::Failed {
                    device_id: id.clone(),
                    reason,
                })
            }
        }
    }
}

/// Resets `PendingPairing` back to `Untrusted` when the pairing future is
/// dropped before an outcome is recorded.
struct PendingGuard {
    registry: Arc<DeviceRegistry>,
    id: DeviceId,
    settled: bool,
}

impl PendingGuard {
    fn new(registry: Arc<DeviceRegistry>, id: DeviceId) -> Self {
        Self {
            registry,
            id,
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let registry = self.registry.clone();
        let id = self.id.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if registry.abandon_pairing(&id).await {
                        debug!(device_id = %id, "Abandoned interrupted pairing");
                    }
                });
            }
            Err(_) => warn!(device_id = %self.id, "No runtime left to reset interrupted pairing"),
        }
    }
}
