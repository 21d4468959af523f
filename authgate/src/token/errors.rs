//! Access token error types.

use thiserror::Error;

/// Errors raised while minting access tokens
#[derive(Debug, Error)]
pub enum TokenError {
    /// JWT encoding error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Additional claim collides with a registered claim name
    #[error("Claim name '{0}' is reserved")]
    ReservedClaim(String),

    /// Expiry is not representable
    #[error("Token lifetime out of range")]
    LifetimeOutOfRange,

    /// Current key lost its private half
    #[error("Signing key {0} cannot sign")]
    SigningUnavailable(String),
}

impl TokenError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            TokenError::ReservedClaim(_) => self.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

/// Result type for token minting
pub type TokenResult<T> = Result<T, TokenError>;

/// Why an access token was rejected.
///
/// Validation failures are expected outcomes and are returned, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    /// Not a well-formed token, or no key id in its header
    #[error("Malformed token")]
    Malformed,

    /// Signature does not verify under the key named by the token
    #[error("Invalid token signature")]
    SignatureInvalid,

    /// Expiry is in the past
    #[error("Token expired")]
    Expired,

    /// Key id matches neither the current nor any legacy key
    #[error("Unknown signing key")]
    UnknownKey,

    /// Issuer differs from the configured issuer
    #[error("Issuer mismatch")]
    IssuerMismatch,
}
