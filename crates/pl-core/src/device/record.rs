use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{DeviceStatus, DeviceType, Endpoint, Sighting, TransportKind, TrustState};
use crate::ids::DeviceId;
use crate::network::quality;

/// Everything the registry knows about one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub addresses: Vec<Endpoint>,
    pub capabilities: BTreeSet<String>,
    pub status: DeviceStatus,
    pub trust: TrustState,
    pub quality_score: f64,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub source: TransportKind,
    /// Timestamp of the sighting that last set name/type/capabilities.
    /// `None` while only probe evidence exists.
    #[serde(default)]
    pub identity_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pairing_attempts: u32,
    #[serde(default)]
    pub pairing_successes: u32,
}

impl DeviceRecord {
    pub fn from_sighting(sighting: &Sighting) -> Self {
        let status = if sighting.confirms_reachability() {
            DeviceStatus::Online
        } else {
            DeviceStatus::Discovered
        };
        let quality_score = if sighting.transport == TransportKind::Probe {
            quality::PROBE_INITIAL_QUALITY
        } else {
            quality::initial_confidence(sighting.address.ip())
        };
        let name = sighting
            .name
            .clone()
            .unwrap_or_else(|| sighting.address.ip().to_string());

        Self {
            id: sighting.id.clone(),
            name,
            device_type: sighting.device_type.unwrap_or_default(),
            addresses: vec![sighting.endpoint()],
            capabilities: sighting.capabilities.clone().unwrap_or_default(),
            status,
            trust: TrustState::Untrusted,
            quality_score,
            latency_ms: None,
            first_seen: sighting.timestamp,
            last_seen: sighting.timestamp,
            source: sighting.transport,
            identity_updated_at: sighting.carries_identity().then_some(sighting.timestamp),
            pairing_attempts: 0,
            pairing_successes: 0,
        }
    }

    /// Preferred endpoint: multicast over pub/sub over probe, newest first
    /// within a transport.
    pub fn primary_endpoint(&self) -> Option<&Endpoint> {
        self.addresses.iter().min_by(|a, b| {
            a.transport
                .preference()
                .cmp(&b.transport.preference())
                .then_with(|| b.seen_at.cmp(&a.seen_at))
        })
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn pairing_success_rate(&self) -> Option<f64> {
        if self.pairing_attempts == 0 {
            return None;
        }
        Some(self.pairing_successes as f64 / self.pairing_attempts as f64)
    }

    /// Add or replace the endpoint for the endpoint's transport. An entry is
    /// only replaced by an observation at least as new. Returns true when the
    /// stored endpoint changed.
    pub fn upsert_endpoint(&mut self, endpoint: Endpoint) -> bool {
        match self
            .addresses
            .iter_mut()
            .find(|e| e.transport == endpoint.transport)
        {
            Some(existing) if endpoint.seen_at >= existing.seen_at => {
                let changed = *existing != endpoint;
                *existing = endpoint;
                changed
            }
            Some(_) => false,
            None => {
                self.addresses.push(endpoint);
                true
            }
        }
    }
}
