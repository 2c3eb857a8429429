use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Coordinator lifecycle: `Stopped -> Starting -> Running -> Stopping -> Stopped`.
/// A failed start goes straight back to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl Display for DiscoveryState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DiscoveryState::Stopped => "stopped",
            DiscoveryState::Starting => "starting",
            DiscoveryState::Running => "running",
            DiscoveryState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}
