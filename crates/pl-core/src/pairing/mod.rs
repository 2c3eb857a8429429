//! Pairing domain: outcomes, the auto-pair policy and pairing tokens.

mod outcome;
mod policy;
mod token;

pub use outcome::{PairingFailureReason, PairingOutcome};
pub use policy::{AutoPairPolicy, Eligibility};
pub use token::{PairingToken, TokenError, TOKEN_SCHEME, TOKEN_TTL_SECS};
