use crate::config::TrustConfig;
use crate::device::{DeviceRecord, TrustState};

/// Why a device qualified for automatic pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    TrustedCapability,
    PairingHistory,
}

/// Auto-pair eligibility.
///
/// A device qualifies when it advertises the trusted capability tag, or when
/// it has at least `min_history_samples` recorded pairing attempts and a
/// success rate strictly above `success_rate_threshold`.
///
/// NOTE: the capability is self-reported by the peer. This policy is a
/// placeholder that needs a security review before it is relied on.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoPairPolicy {
    pub trusted_capability: String,
    pub success_rate_threshold: f64,
    pub min_history_samples: u32,
}

impl AutoPairPolicy {
    pub fn from_config(config: &TrustConfig) -> Self {
        Self {
            trusted_capability: config.trusted_capability.clone(),
            success_rate_threshold: config.success_rate_threshold,
            min_history_samples: config.min_history_samples,
        }
    }

    pub fn evaluate(&self, record: &DeviceRecord) -> Option<Eligibility> {
        // Rejected peers only come back through an explicit pair request.
        if record.trust != TrustState::Untrusted {
            return None;
        }
        if !self.trusted_capability.is_empty() && record.has_capability(&self.trusted_capability) {
            return Some(Eligibility::TrustedCapability);
        }
        if record.pairing_attempts >= self.min_history_samples {
            if let Some(rate) = record.pairing_success_rate() {
                if rate > self.success_rate_threshold {
                    return Some(Eligibility::PairingHistory);
                }
            }
        }
        None
    }

    pub fn is_eligible(&self, record: &DeviceRecord) -> bool {
        self.evaluate(record).is_some()
    }
}

impl Default for AutoPairPolicy {
    fn default() -> Self {
        Self::from_config(&TrustConfig::default())
    }
}
