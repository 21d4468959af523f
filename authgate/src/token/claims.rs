//! Claim set carried by access tokens.

use super::errors::{TokenError, TokenResult};
use crate::signin::TwoFactorProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Claim names owned by the token envelope or the typed claims
pub const RESERVED_CLAIMS: &[&str] = &[
    "iss", "sub", "aud", "exp", "nbf", "iat", "jti", "tid", "role", "tfv", "tfp", "did",
];

/// Role of the authenticated principal within its team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
    Owner,
}

/// Value of an additional claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Bool(bool),
    Text(String),
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        ClaimValue::Bool(value)
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        ClaimValue::Text(value.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        ClaimValue::Text(value)
    }
}

/// Identity facts about an authenticated principal.
///
/// Immutable once built; use [`ClaimSet::builder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tid: Option<Uuid>,
    role: Role,
    tfv: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tfp: Option<TwoFactorProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    did: Option<String>,
    #[serde(flatten)]
    additional: BTreeMap<String, ClaimValue>,
}

impl ClaimSet {
    /// Start building a claim set for `subject`
    pub fn builder(subject: Uuid, role: Role) -> ClaimSetBuilder {
        ClaimSetBuilder {
            inner: ClaimSet {
                sub: subject,
                tid: None,
                role,
                tfv: false,
                tfp: None,
                did: None,
                additional: BTreeMap::new(),
            },
        }
    }

    /// User id
    pub fn subject(&self) -> Uuid {
        self.sub
    }

    /// Team (tenant) id
    pub fn team_id(&self) -> Option<Uuid> {
        self.tid
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether a second factor was verified for this session
    pub fn two_factor_verified(&self) -> bool {
        self.tfv
    }

    /// Provider of a second factor that still has to be presented
    pub fn two_factor_pending(&self) -> Option<TwoFactorProvider> {
        self.tfp
    }

    /// True while the token only proves the first factor
    pub fn is_two_factor_pending(&self) -> bool {
        self.tfp.is_some()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.did.as_deref()
    }

    /// Additional claims, ordered by name
    pub fn additional(&self) -> &BTreeMap<String, ClaimValue> {
        &self.additional
    }

    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.additional.get(name)
    }
}

/// Builder for [`ClaimSet`]
#[derive(Debug, Clone)]
pub struct ClaimSetBuilder {
    inner: ClaimSet,
}

impl ClaimSetBuilder {
    pub fn team(mut self, team_id: Option<Uuid>) -> Self {
        self.inner.tid = team_id;
        self
    }

    pub fn device(mut self, device_id: Option<String>) -> Self {
        self.inner.did = device_id;
        self
    }

    pub fn two_factor_verified(mut self, verified: bool) -> Self {
        self.inner.tfv = verified;
        self
    }

    /// Mark the token as waiting for a second factor from `provider`.
    ///
    /// Clears the verified flag.
    pub fn two_factor_pending(mut self, provider: TwoFactorProvider) -> Self {
        self.inner.tfp = Some(provider);
        self.inner.tfv = false;
        self
    }

    /// Add an additional claim
    ///
    /// # Errors
    ///
    /// * `TokenError::ReservedClaim` - `name` is used by the envelope or a typed claim
    pub fn claim(mut self, name: &str, value: impl Into<ClaimValue>) -> TokenResult<Self> {
        if RESERVED_CLAIMS.contains(&name) {
            return Err(TokenError::ReservedClaim(name.to_string()));
        }
        self.inner.additional.insert(name.to_string(), value.into());
        Ok(self)
    }

    pub fn build(self) -> ClaimSet {
        self.inner
    }
}
