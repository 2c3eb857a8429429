//! The authoritative device registry.
//!
//! All writes go through one `tokio::sync::Mutex`; every operation is a single
//! critical section with no `.await` inside it, so merges and transitions are
//! totally ordered. Change notifications are published on a broadcast channel
//! while the lock is held, which keeps event order identical to mutation
//! order.

mod error;
mod snapshot;

pub use error::RegistryError;
pub use snapshot::{RegistrySnapshot, SNAPSHOT_VERSION};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::device::{DeviceRecord, DeviceStatus, Sighting, TrustState};
use crate::events::DeviceEvent;
use crate::ids::DeviceId;
use crate::network::quality;
use crate::pairing::PairingOutcome;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Result of a single merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Record the sighting landed in. Differs from the sighting id when a
    /// probe hit was attributed to an already identified device.
    pub device_id: DeviceId,
    pub created: bool,
    pub status_change: Option<(DeviceStatus, DeviceStatus)>,
    /// Probe placeholders folded into `device_id`.
    pub absorbed: Vec<DeviceId>,
}

pub struct DeviceRegistry {
    devices: Mutex<HashMap<DeviceId, DeviceRecord>>,
    events: broadcast::Sender<DeviceEvent>,
    ttl: ChronoDuration,
}

impl DeviceRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self::with_event_capacity(ttl, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(ttl: Duration, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            devices: Mutex::new(HashMap::new()),
            events,
            ttl: ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DeviceEvent) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(event);
    }

    /// Reconcile one sighting into the registry.
    pub async fn merge(&self, sighting: Sighting) -> MergeOutcome {
        let mut devices = self.devices.lock().await;
        let ip = sighting.address.ip();

        let target = if sighting.id.is_probe_placeholder() {
            identified_at(&devices, sighting.address).unwrap_or_else(|| sighting.id.clone())
        } else {
            sighting.id.clone()
        };

        let mut absorbed = Vec::new();
        let mut absorbed_records = Vec::new();
        if !target.is_probe_placeholder() {
            let placeholders: Vec<DeviceId> = devices
                .values()
                .filter(|r| r.id.is_probe_placeholder() && r.addresses.iter().any(|e| e.address == ip))
                .map(|r| r.id.clone())
                .collect();
            for id in placeholders {
                if let Some(record) = devices.remove(&id) {
                    absorbed_records.push(record);
                    absorbed.push(id);
                }
            }
        }

        self.emit(DeviceEvent::SightingReceived {
            device_id: target.clone(),
            transport: sighting.transport,
        });
        for id in &absorbed {
            debug!(device_id = %target, placeholder = %id, "absorbed probe placeholder");
            self.emit(DeviceEvent::DeviceForgotten {
                device_id: id.clone(),
            });
        }

        let mut status_change = None;
        let created = match devices.get_mut(&target) {
            Some(record) => {
                for old in absorbed_records {
                    absorb(record, old);
                }
                let previous = record.status;
                apply_sighting(record, &sighting);
                if record.status != previous {
                    status_change = Some((previous, record.status));
                    self.emit(DeviceEvent::StatusChanged {
                        device_id: target.clone(),
                        from: previous,
                        to: record.status,
                    });
                }
                false
            }
            None => {
                let mut record = DeviceRecord::from_sighting(&sighting);
                record.id = target.clone();
                let reachable = absorbed_records.iter().any(|r| r.status.is_live());
                for old in absorbed_records {
                    absorb(&mut record, old);
                }
                if reachable && record.status == DeviceStatus::Discovered {
                    record.status = DeviceStatus::Online;
                }
                info!(
                    device_id = %record.id,
                    transport = %sighting.transport,
                    status = %record.status,
                    "new device"
                );
                devices.insert(target.clone(), record.clone());
                self.emit(DeviceEvent::DeviceAdded { device: record });
                true
            }
        };

        MergeOutcome {
            device_id: target,
            created,
            status_change,
            absorbed,
        }
    }

    /// Mark live records that have been silent longer than the TTL as offline.
    /// Records are kept; trust is untouched.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Vec<DeviceId> {
        let mut devices = self.devices.lock().await;
        let mut expired = Vec::new();
        for record in devices.values_mut() {
            if record.status.is_live() && now - record.last_seen > self.ttl {
                let from = record.status;
                record.status = DeviceStatus::Offline;
                debug!(device_id = %record.id, from = %from, "device went offline");
                self.emit(DeviceEvent::StatusChanged {
                    device_id: record.id.clone(),
                    from,
                    to: DeviceStatus::Offline,
                });
                expired.push(record.id.clone());
            }
        }
        expired.sort();
        expired
    }

    pub async fn set_status(
        &self,
        id: &DeviceId,
        status: DeviceStatus,
    ) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self.devices.lock().await;
        let record = devices
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.clone()))?;
        self.transition_status(record, status)?;
        Ok(record.clone())
    }

    pub async fn set_trust(
        &self,
        id: &DeviceId,
        trust: TrustState,
    ) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self.devices.lock().await;
        let record = devices
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.clone()))?;
        self.transition_trust(record, trust)?;
        Ok(record.clone())
    }

    /// Fold one quality sample into the record's moving average. Returns the
    /// stored score, which is always within [0, 1].
    pub async fn set_quality(
        &self,
        id: &DeviceId,
        sample: f64,
        smoothing: f64,
        latency: Option<Duration>,
    ) -> Result<f64, RegistryError> {
        let mut devices = self.devices.lock().await;
        let record = devices
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.clone()))?;
        let score = quality::smooth(record.quality_score, sample, smoothing);
        record.latency_ms = latency.map(|d| d.as_millis().min(u64::MAX as u128) as u64);
        if (score - record.quality_score).abs() > f64::EPSILON {
            record.quality_score = score;
            self.emit(DeviceEvent::QualityChanged {
                device_id: id.clone(),
                score,
            });
        }
        Ok(record.quality_score)
    }

    /// Apply a finished handshake. The device must be `PendingPairing`; an
    /// unpair that raced the handshake makes this fail with an invalid trust
    /// transition and leaves the record alone.
    pub async fn record_pairing_outcome(
        &self,
        id: &DeviceId,
        outcome: &PairingOutcome,
    ) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self.devices.lock().await;
        let record = devices
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.clone()))?;

        let trust = if outcome.is_success() {
            TrustState::Trusted
        } else {
            TrustState::Rejected
        };
        if !record.trust.can_transition_to(trust) {
            return Err(RegistryError::InvalidTrustTransition {
                device_id: id.clone(),
                from: record.trust,
                to: trust,
            });
        }

        record.pairing_attempts = record.pairing_attempts.saturating_add(1);
        if outcome.is_success() {
            record.pairing_successes = record.pairing_successes.saturating_add(1);
        }
        self.transition_trust(record, trust)?;
        if outcome.is_success() {
            // A completed handshake proves reachability.
            if matches!(record.status, DeviceStatus::Discovered | DeviceStatus::Offline) {
                self.transition_status(record, DeviceStatus::Online)?;
            }
            self.transition_status(record, DeviceStatus::Paired)?;
        }
        self.emit(DeviceEvent::PairingResult {
            device_id: id.clone(),
            outcome: outcome.clone(),
        });
        Ok(record.clone())
    }

    /// Move a device into `PendingPairing`. A second request while one is
    /// pending fails with `InvalidTrustTransition { from: PendingPairing, .. }`.
    pub async fn begin_pairing(&self, id: &DeviceId) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self.devices.lock().await;
        let record = devices
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.clone()))?;
        if record.trust == TrustState::PendingPairing {
            return Err(RegistryError::InvalidTrustTransition {
                device_id: id.clone(),
                from: TrustState::PendingPairing,
                to: TrustState::PendingPairing,
            });
        }
        self.transition_trust(record, TrustState::PendingPairing)?;
        Ok(record.clone())
    }

    /// Drop a pairing whose handshake will never report back. Only touches
    /// records still in `PendingPairing`; returns whether anything changed.
    pub async fn abandon_pairing(&self, id: &DeviceId) -> bool {
        let mut devices = self.devices.lock().await;
        match devices.get_mut(id) {
            Some(record) if record.trust == TrustState::PendingPairing => self
                .transition_trust(record, TrustState::Untrusted)
                .is_ok(),
            _ => false,
        }
    }

    /// Clear trust and drop `Paired` back to `Online`. The record stays.
    pub async fn unpair(&self, id: &DeviceId) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self.devices.lock().await;
        let record = devices
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.clone()))?;
        self.transition_trust(record, TrustState::Untrusted)?;
        if record.status == DeviceStatus::Paired {
            self.transition_status(record, DeviceStatus::Online)?;
        }
        Ok(record.clone())
    }

    /// Remove a record from the live set.
    pub async fn forget(&self, id: &DeviceId) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self.devices.lock().await;
        let record = devices
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.clone()))?;
        self.emit(DeviceEvent::DeviceForgotten {
            device_id: id.clone(),
        });
        Ok(record)
    }

    pub async fn get(&self, id: &DeviceId) -> Option<DeviceRecord> {
        self.devices.lock().await.get(id).cloned()
    }

    /// All records, ordered by id.
    pub async fn list(&self) -> Vec<DeviceRecord> {
        let devices = self.devices.lock().await;
        let mut records: Vec<DeviceRecord> = devices.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.lock().await.is_empty()
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> RegistrySnapshot {
        RegistrySnapshot::new(now, self.list().await)
    }

    /// Load persisted records. Live records win over persisted ones; restored
    /// records come back offline, and an interrupted pairing is forgotten.
    /// Returns how many records were inserted.
    pub async fn restore(&self, snapshot: RegistrySnapshot) -> usize {
        let mut devices = self.devices.lock().await;
        let mut restored = 0;
        for mut record in snapshot.devices {
            if devices.contains_key(&record.id) {
                continue;
            }
            if record.status != DeviceStatus::Discovered {
                record.status = DeviceStatus::Offline;
            }
            if record.trust == TrustState::PendingPairing {
                record.trust = TrustState::Untrusted;
            }
            record.quality_score = quality::clamp_unit(record.quality_score);
            devices.insert(record.id.clone(), record.clone());
            self.emit(DeviceEvent::DeviceAdded { device: record });
            restored += 1;
        }
        restored
    }

    fn transition_status(
        &self,
        record: &mut DeviceRecord,
        to: DeviceStatus,
    ) -> Result<(), RegistryError> {
        let from = record.status;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition {
                device_id: record.id.clone(),
                from,
                to,
            });
        }
        record.status = to;
        self.emit(DeviceEvent::StatusChanged {
            device_id: record.id.clone(),
            from,
            to,
        });
        Ok(())
    }

    fn transition_trust(
        &self,
        record: &mut DeviceRecord,
        to: TrustState,
    ) -> Result<(), RegistryError> {
        let from = record.trust;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(RegistryError::InvalidTrustTransition {
                device_id: record.id.clone(),
                from,
                to,
            });
        }
        record.trust = to;
        self.emit(DeviceEvent::TrustChanged {
            device_id: record.id.clone(),
            from,
            to,
        });
        Ok(())
    }
}

/// Identified (non-placeholder) record that already owns `addr`. Several
/// instances can share one host: an exact port match wins, otherwise the
/// smallest id on that IP.
fn identified_at(devices: &HashMap<DeviceId, DeviceRecord>, addr: SocketAddr) -> Option<DeviceId> {
    devices
        .values()
        .filter(|r| !r.id.is_probe_placeholder())
        .filter_map(|r| {
            let mut on_ip = r
                .addresses
                .iter()
                .filter(|e| e.address == addr.ip())
                .peekable();
            on_ip.peek()?;
            let exact = on_ip.any(|e| e.port == addr.port());
            Some((!exact, &r.id))
        })
        .min()
        .map(|(_, id)| id.clone())
}

fn absorb(record: &mut DeviceRecord, placeholder: DeviceRecord) {
    for endpoint in placeholder.addresses {
        record.upsert_endpoint(endpoint);
    }
    record.last_seen = record.last_seen.max(placeholder.last_seen);
}

fn apply_sighting(record: &mut DeviceRecord, sighting: &Sighting) {
    if sighting.carries_identity() {
        let newer = record
            .identity_updated_at
            .map_or(true, |at| sighting.timestamp >= at);
        if newer {
            if let Some(name) = &sighting.name {
                record.name = name.clone();
            }
            if let Some(device_type) = sighting.device_type {
                record.device_type = device_type;
            }
            if let Some(capabilities) = &sighting.capabilities {
                record.capabilities = capabilities.clone();
            }
            record.identity_updated_at = Some(sighting.timestamp);
        }
    }

    record.upsert_endpoint(sighting.endpoint());

    let previous_seen = record.last_seen;
    if sighting.timestamp >= previous_seen {
        record.source = sighting.transport;
        record.last_seen = sighting.timestamp;
    }

    record.status = match record.status {
        DeviceStatus::Discovered => DeviceStatus::Online,
        // Only fresher evidence revives an expired device; Paired is never
        // touched by a sighting.
        DeviceStatus::Offline if sighting.timestamp > previous_seen => DeviceStatus::Online,
        other => other,
    };
}
