use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::net::SocketAddr;

use super::{DeviceType, Endpoint, TransportKind};
use crate::ids::DeviceId;

/// A single observation of a peer, produced by one transport and merged into
/// the registry.
///
/// Passive transports (multicast, pub/sub) carry identity fields. Probe
/// sightings only carry reachability and use a placeholder id.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub id: DeviceId,
    pub name: Option<String>,
    pub device_type: Option<DeviceType>,
    pub capabilities: Option<BTreeSet<String>>,
    pub address: SocketAddr,
    pub transport: TransportKind,
    pub timestamp: DateTime<Utc>,
}

impl Sighting {
    pub fn probe(address: SocketAddr, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: DeviceId::probe_placeholder(address),
            name: None,
            device_type: None,
            capabilities: None,
            address,
            transport: TransportKind::Probe,
            timestamp,
        }
    }

    /// Active confirmation of reachability, as opposed to a passive announcement.
    pub fn confirms_reachability(&self) -> bool {
        self.transport == TransportKind::Probe
    }

    pub fn carries_identity(&self) -> bool {
        self.name.is_some() || self.device_type.is_some() || self.capabilities.is_some()
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.transport, self.address, self.timestamp)
    }
}
