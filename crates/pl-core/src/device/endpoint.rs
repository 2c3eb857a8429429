use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr};

/// Discovery mechanism that produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Multicast,
    PubSub,
    Probe,
}

impl TransportKind {
    /// Lower is preferred when choosing a primary endpoint.
    pub fn preference(self) -> u8 {
        match self {
            TransportKind::Multicast => 0,
            TransportKind::PubSub => 1,
            TransportKind::Probe => 2,
        }
    }
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransportKind::Multicast => "multicast",
            TransportKind::PubSub => "pubsub",
            TransportKind::Probe => "probe",
        };
        f.write_str(label)
    }
}

/// A reachable address for a device, tagged by the transport that saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub transport: TransportKind,
    pub address: IpAddr,
    pub port: u16,
    pub seen_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn new(transport: TransportKind, addr: SocketAddr, seen_at: DateTime<Utc>) -> Self {
        Self {
            transport,
            address: addr.ip(),
            port: addr.port(),
            seen_at,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
