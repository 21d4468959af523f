//! Token package data models.

use crate::{refresh::IssuedRefreshToken, signin::TwoFactorProvider, token::AccessToken};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Second factor the client has to present next
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TwoFactorChallenge {
    pub provider: TwoFactorProvider,
    pub extra_info: Option<String>,
}

/// Everything handed to a client after sign-in or refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPackage {
    pub access_token: AccessToken,
    /// Never present while a second factor is pending
    pub refresh_token: Option<IssuedRefreshToken>,
    pub challenge: Option<TwoFactorChallenge>,
}

impl TokenPackage {
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn is_two_factor_pending(&self) -> bool {
        self.challenge.is_some()
    }

    /// Wire form of the package, with lifetimes relative to `now`
    pub fn to_response(&self, now: DateTime<Utc>) -> TokenResponse {
        TokenResponse {
            access_token: self.access_token.token.clone(),
            token_type: "Bearer",
            expires_in: (self.access_token.expires_at - now).num_seconds().max(0),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|issued| issued.payload().to_string()),
            refresh_token_expires_at: self.refresh_token.as_ref().map(|issued| issued.expires_at()),
            two_factor: self.challenge.clone(),
        }
    }
}

/// Serializable token endpoint body
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Seconds until the access token expires
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_factor: Option<TwoFactorChallenge>,
}
