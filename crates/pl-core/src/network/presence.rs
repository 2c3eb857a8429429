//! Transport-agnostic presence payload.
//!
//! Every transport carries the same JSON document:
//!
//! ```json
//! {"id":"...","name":"...","type":"desktop","capabilities":["file_transfer"],
//!  "timestamp":"2026-01-01T00:00:00Z","port":8080,"host":"192.168.1.20"}
//! ```
//!
//! `port` and `host` are optional. Multicast sightings take their address
//! from the datagram source; pub/sub sightings require `host`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

use crate::device::{DeviceType, LocalDevice, Sighting, TransportKind};
use crate::ids::DeviceId;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid presence json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("presence payload has an empty device id")]
    EmptyId,

    #[error("presence payload uses the reserved id {0}")]
    ReservedId(DeviceId),

    #[error("presence payload from {transport} carries no host address")]
    MissingHost { transport: TransportKind },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub id: DeviceId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<IpAddr>,
}

impl PresencePayload {
    pub fn announce(local: &LocalDevice, now: DateTime<Utc>) -> Self {
        Self {
            id: local.id.clone(),
            name: local.name.clone(),
            device_type: local.device_type,
            capabilities: local.capabilities.clone(),
            timestamp: now,
            port: Some(local.service_port),
            host: local.host,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, PayloadError> {
        let payload: PresencePayload = serde_json::from_slice(bytes)?;
        if payload.id.is_empty() {
            return Err(PayloadError::EmptyId);
        }
        if payload.id.is_probe_placeholder() {
            return Err(PayloadError::ReservedId(payload.id));
        }
        Ok(payload)
    }

    /// Turn a received payload into a sighting.
    ///
    /// `source` is the network source address when the transport has one; it
    /// takes precedence over the advertised `host`. The advertised `port`
    /// falls back to `default_port`. Timestamps further in the future than
    /// `max_skew` past `received_at` are clamped so a peer with a fast clock
    /// cannot pin its identity fields.
    pub fn into_sighting(
        self,
        transport: TransportKind,
        source: Option<IpAddr>,
        default_port: u16,
        received_at: DateTime<Utc>,
        max_skew: Duration,
    ) -> Result<Sighting, PayloadError> {
        let ip = source
            .or(self.host)
            .ok_or(PayloadError::MissingHost { transport })?;
        let port = self.port.unwrap_or(default_port);
        let skew = ChronoDuration::from_std(max_skew).unwrap_or(ChronoDuration::zero());
        let timestamp = self.timestamp.min(received_at + skew);

        Ok(Sighting {
            id: self.id,
            name: Some(self.name),
            device_type: Some(self.device_type),
            capabilities: Some(self.capabilities),
            address: SocketAddr::new(ip, port),
            transport,
            timestamp,
        })
    }
}
