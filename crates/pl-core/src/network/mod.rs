//! Wire-level discovery concerns shared by every transport.

pub mod presence;
pub mod quality;
pub mod topics;

pub use presence::{PayloadError, PresencePayload};
