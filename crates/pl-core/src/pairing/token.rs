use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt::{Display, Formatter};
use thiserror::Error;

use crate::ids::DeviceId;

pub const TOKEN_SCHEME: &str = "peerlink://pair/";
pub const TOKEN_TTL_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("pairing token must start with {}", TOKEN_SCHEME)]
    Scheme,
    #[error("pairing token must have exactly three segments")]
    Arity,
    #[error("pairing token device id is empty")]
    EmptyDeviceId,
    #[error("pairing token timestamp is not a unix timestamp: {0}")]
    Timestamp(String),
    #[error("pairing token signature is empty")]
    EmptySignature,
    #[error("pairing token expired")]
    Expired,
    #[error("pairing token is issued in the future")]
    FromFuture,
}

/// Out-of-band pairing token, `peerlink://pair/{device_id}/{unix_ts}/{signature}`,
/// typically rendered as a QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingToken {
    pub device_id: DeviceId,
    pub issued_at: DateTime<Utc>,
    pub signature: String,
}

impl PairingToken {
    pub fn issue(device_id: DeviceId, issued_at: DateTime<Utc>, signature: impl Into<String>) -> Self {
        Self {
            device_id,
            issued_at,
            signature: signature.into(),
        }
    }

    /// Parse and validate a token against `now`. Tokens older than five minutes
    /// are expired; tokens newer than `now + max_skew` are refused.
    pub fn parse(raw: &str, now: DateTime<Utc>, max_skew: Duration) -> Result<Self, TokenError> {
        let rest = raw.trim().strip_prefix(TOKEN_SCHEME).ok_or(TokenError::Scheme)?;
        let parts: Vec<&str> = rest.split('/').collect();
        let [id, ts, signature] = parts.as_slice() else {
            return Err(TokenError::Arity);
        };
        if id.is_empty() {
            return Err(TokenError::EmptyDeviceId);
        }
        if signature.is_empty() {
            return Err(TokenError::EmptySignature);
        }
        let secs: i64 = ts
            .parse()
            .map_err(|_| TokenError::Timestamp(ts.to_string()))?;
        let issued_at = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| TokenError::Timestamp(ts.to_string()))?;

        if issued_at > now + max_skew {
            return Err(TokenError::FromFuture);
        }
        if now - issued_at > Duration::seconds(TOKEN_TTL_SECS) {
            return Err(TokenError::Expired);
        }

        Ok(Self {
            device_id: DeviceId::new(*id),
            issued_at,
            signature: signature.to_string(),
        })
    }
}

impl Display for PairingToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}/{}/{}",
            TOKEN_SCHEME,
            self.device_id,
            self.issued_at.timestamp(),
            self.signature
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn parses_issued_token() {
        let token = PairingToken::issue(DeviceId::new("dev-9"), now(), "c2ln");
        let raw = token.to_string();
        assert_eq!(raw, "peerlink://pair/dev-9/1700000000/c2ln");
        let parsed = PairingToken::parse(&raw, now() + Duration::seconds(60), Duration::seconds(30)).unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn rejects_malformed_tokens() {
        let skew = Duration::seconds(30);
        assert_eq!(PairingToken::parse("misa://pair/a/1/s", now(), skew), Err(TokenError::Scheme));
        assert_eq!(PairingToken::parse("peerlink://pair/a/1", now(), skew), Err(TokenError::Arity));
        assert_eq!(
            PairingToken::parse("peerlink://pair/a/1700000000/", now(), skew),
            Err(TokenError::EmptySignature)
        );
        assert!(matches!(
            PairingToken::parse("peerlink://pair/a/soon/sig", now(), skew),
            Err(TokenError::Timestamp(_))
        ));
    }

    #[test]
    fn enforces_five_minute_window() {
        let skew = Duration::seconds(30);
        let raw = "peerlink://pair/a/1700000000/sig";
        assert!(PairingToken::parse(raw, now() + Duration::seconds(300), skew).is_ok());
        assert_eq!(
            PairingToken::parse(raw, now() + Duration::seconds(301), skew),
            Err(TokenError::Expired)
        );
        assert_eq!(
            PairingToken::parse(raw, now() - Duration::seconds(31), skew),
            Err(TokenError::FromFuture)
        );
    }
}
