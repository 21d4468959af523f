//! Refresh token data models.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Random bytes in a refresh token payload
pub const PAYLOAD_BYTES: usize = 32;

/// Effective lifetime of tokens issued under [`RotationPolicy::NeverExpire`]
pub const NEVER_EXPIRE_HORIZON_DAYS: i64 = 36_500;

/// When an exchanged refresh token gets a new payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationPolicy {
    /// Every exchange replaces the payload
    #[default]
    Always,
    /// Replace the payload once half of the token's lifetime has passed
    HalfLife,
    /// Never replaced, valid until revoked
    NeverExpire,
    /// Never replaced, expires normally
    Disabled,
}

impl RotationPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RotationPolicy::Always => "always",
            RotationPolicy::HalfLife => "half-life",
            RotationPolicy::NeverExpire => "never-expire",
            RotationPolicy::Disabled => "disabled",
        }
    }
}

impl fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized rotation policy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown rotation policy: {0}")]
pub struct UnknownPolicy(pub String);

impl FromStr for RotationPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "always" => Ok(RotationPolicy::Always),
            "half-life" | "halflife" => Ok(RotationPolicy::HalfLife),
            "never-expire" | "neverexpire" => Ok(RotationPolicy::NeverExpire),
            "disabled" => Ok(RotationPolicy::Disabled),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// Stored refresh token record. Holds only the payload hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    /// Hex SHA-256 of the current payload
    pub payload_hash: String,
    /// Hash of the payload replaced by the last rotation
    pub previous_payload_hash: Option<String>,
    pub user_id: Uuid,
    pub device_id: Option<String>,
    /// Time of issue or of the last rotation
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Not revoked and not expired
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    /// Span between issue (or last rotation) and expiry
    pub fn lifetime(&self) -> Duration {
        self.expires_at - self.issued_at
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// A freshly minted payload together with its stored record.
///
/// The raw payload exists only here; it is never stored or logged.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedRefreshToken {
    payload: String,
    pub record: RefreshToken,
}

impl IssuedRefreshToken {
    pub(crate) fn new(payload: String, record: RefreshToken) -> Self {
        Self { payload, record }
    }

    /// Raw payload to hand to the client
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.record.expires_at
    }
}

impl fmt::Debug for IssuedRefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedRefreshToken")
            .field("payload", &"<redacted>")
            .field("record", &self.record)
            .finish()
    }
}

/// Result of applying a rotation policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    /// New payload issued; the presented one is dead
    Rotated(IssuedRefreshToken),
    /// Presented payload stays valid
    Unchanged(RefreshToken),
}

impl Rotation {
    pub fn record(&self) -> &RefreshToken {
        match self {
            Rotation::Rotated(issued) => &issued.record,
            Rotation::Unchanged(record) => record,
        }
    }

    /// New payload, if one was issued
    pub fn new_payload(&self) -> Option<&str> {
        match self {
            Rotation::Rotated(issued) => Some(issued.payload()),
            Rotation::Unchanged(_) => None,
        }
    }

    pub fn is_rotated(&self) -> bool {
        matches!(self, Rotation::Rotated(_))
    }
}

/// New payload state written by a rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadReplacement {
    pub payload_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Generate a random base64url payload
pub fn generate_payload() -> String {
    let mut bytes = [0u8; PAYLOAD_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Hex SHA-256 of a raw payload
pub fn hash_payload(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parses_config_names() {
        assert_eq!("always".parse(), Ok(RotationPolicy::Always));
        assert_eq!("half-life".parse(), Ok(RotationPolicy::HalfLife));
        assert_eq!("HALF_LIFE".parse(), Ok(RotationPolicy::HalfLife));
        assert_eq!("never-expire".parse(), Ok(RotationPolicy::NeverExpire));
        assert_eq!(" disabled ".parse(), Ok(RotationPolicy::Disabled));
        assert!("weekly".parse::<RotationPolicy>().is_err());
    }

    #[test]
    fn test_policy_display_matches_serde() {
        for policy in [
            RotationPolicy::Always,
            RotationPolicy::HalfLife,
            RotationPolicy::NeverExpire,
            RotationPolicy::Disabled,
        ] {
            let json = serde_json::to_string(&policy).unwrap();
            assert_eq!(json, format!("\"{policy}\""));
        }
    }

    #[test]
    fn test_payload_is_unpadded_base64url() {
        let payload = generate_payload();
        assert_eq!(payload.len(), 43);
        assert!(
            payload
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(payload, generate_payload());
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        assert_eq!(
            hash_payload("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_issued_token_debug_hides_payload() {
        let now = Utc::now();
        let issued = IssuedRefreshToken::new(
            "super-secret-payload".to_string(),
            RefreshToken {
                id: Uuid::new_v4(),
                payload_hash: hash_payload("super-secret-payload"),
                previous_payload_hash: None,
                user_id: Uuid::new_v4(),
                device_id: None,
                issued_at: now,
                expires_at: now + Duration::days(1),
                revoked: false,
            },
        );
        assert!(!format!("{issued:?}").contains("super-secret-payload"));
    }
}
