//! Access token data models.

use super::claims::ClaimSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed access token ready to hand to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken {
    /// Compact JWT
    pub token: String,
    /// Id of the key that signed it
    pub key_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Claims recovered from a token that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub claims: ClaimSet,
    pub key_id: String,
    pub token_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// JWT payload: registered envelope claims plus the flattened claim set
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TokenPayload {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(flatten)]
    pub claims: ClaimSet,
}
