use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Liveness of a peer.
///
/// Allowed edges:
///
/// ```text
/// Discovered -> Online -> Paired
/// Online -> Offline, Paired -> Offline, Offline -> Online
/// Paired -> Online            (explicit unpair only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Discovered,
    Online,
    Paired,
    Offline,
}

impl DeviceStatus {
    pub fn can_transition_to(self, next: DeviceStatus) -> bool {
        use DeviceStatus::*;
        matches!(
            (self, next),
            (Discovered, Online)
                | (Online, Paired)
                | (Online, Offline)
                | (Paired, Offline)
                | (Offline, Online)
                | (Paired, Online)
        )
    }

    /// Online or Paired: the states the TTL and the quality monitor care about.
    pub fn is_live(self) -> bool {
        matches!(self, DeviceStatus::Online | DeviceStatus::Paired)
    }
}

impl Display for DeviceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceStatus::Discovered => "discovered",
            DeviceStatus::Online => "online",
            DeviceStatus::Paired => "paired",
            DeviceStatus::Offline => "offline",
        };
        f.write_str(label)
    }
}

/// Security classification of a peer, independent of its liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustState {
    Untrusted,
    PendingPairing,
    Trusted,
    Rejected,
}

impl TrustState {
    /// `Rejected -> PendingPairing` is only reachable through an explicit,
    /// user-initiated pairing request; callers enforce that, the table only
    /// says the edge exists.
    pub fn can_transition_to(self, next: TrustState) -> bool {
        use TrustState::*;
        match (self, next) {
            (Untrusted, PendingPairing) | (Rejected, PendingPairing) => true,
            (PendingPairing, Trusted) | (PendingPairing, Rejected) => true,
            (_, Untrusted) => true,
            _ => false,
        }
    }
}

impl Display for TrustState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TrustState::Untrusted => "untrusted",
            TrustState::PendingPairing => "pending_pairing",
            TrustState::Trusted => "trusted",
            TrustState::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_edges_follow_lifecycle() {
        use DeviceStatus::*;
        assert!(Discovered.can_transition_to(Online));
        assert!(Online.can_transition_to(Paired));
        assert!(Paired.can_transition_to(Offline));
        assert!(Offline.can_transition_to(Online));

        assert!(!Discovered.can_transition_to(Paired));
        assert!(!Discovered.can_transition_to(Offline));
        assert!(!Offline.can_transition_to(Paired));
        assert!(!Online.can_transition_to(Discovered));
    }

    #[test]
    fn trust_edges_require_pending_before_trusted() {
        use TrustState::*;
        assert!(Untrusted.can_transition_to(PendingPairing));
        assert!(PendingPairing.can_transition_to(Trusted));
        assert!(PendingPairing.can_transition_to(Rejected));
        assert!(Trusted.can_transition_to(Untrusted));

        assert!(!Untrusted.can_transition_to(Trusted));
        assert!(!Rejected.can_transition_to(Trusted));
        assert!(!Trusted.can_transition_to(Rejected));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TrustState::PendingPairing).unwrap();
        assert_eq!(json, "\"pending_pairing\"");
    }
}
