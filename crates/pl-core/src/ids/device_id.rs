use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;

const PROBE_PLACEHOLDER_PREFIX: &str = "probe:";

/// Stable identifier of a peer, the equality key for registry merges.
///
/// Identified peers announce a UUID they persist across restarts. Peers found
/// only by the subnet prober have no identity yet and get a placeholder id
/// derived from the probed endpoint (`probe:<ip>:<port>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id for the local installation.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn probe_placeholder(addr: SocketAddr) -> Self {
        Self(format!("{PROBE_PLACEHOLDER_PREFIX}{addr}"))
    }

    pub fn is_probe_placeholder(&self) -> bool {
        self.0.starts_with(PROBE_PLACEHOLDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
