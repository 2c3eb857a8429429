use std::collections::BTreeSet;
use std::net::IpAddr;

use super::DeviceType;
use crate::ids::DeviceId;

/// How this process announces itself to peers.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDevice {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub capabilities: BTreeSet<String>,
    pub service_port: u16,
    /// LAN address advertised over transports that carry no source address.
    pub host: Option<IpAddr>,
}
