//! Access token encoding and validation.

use super::{
    claims::ClaimSet,
    errors::{TokenError, TokenResult, ValidationFailure},
    models::{AccessToken, TokenPayload, VerifiedToken},
};
use crate::keys::KeyManager;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Header, Validation, decode, decode_header, encode,
    errors::{Error as JwtError, ErrorKind},
};
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

/// Signs claim sets with the current key and validates incoming tokens
/// against the current and legacy keys.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    keys: Arc<KeyManager>,
    issuer: String,
}

impl TokenCodec {
    /// Create a codec issuing tokens as `issuer`
    pub fn new(keys: Arc<KeyManager>, issuer: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
        }
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign `claims` into a token valid for `lifetime` from now
    ///
    /// # Errors
    ///
    /// * `TokenError::Jwt` - signing failed
    pub fn encode(&self, claims: &ClaimSet, lifetime: Duration) -> TokenResult<AccessToken> {
        self.encode_at(claims, Utc::now(), lifetime)
    }

    /// Sign `claims` into a token issued at `issued_at`
    ///
    /// # Errors
    ///
    /// * `TokenError::SigningUnavailable` - the current key has no private half
    /// * `TokenError::LifetimeOutOfRange` - `issued_at + lifetime` overflows
    /// * `TokenError::Jwt` - signing failed
    pub fn encode_at(
        &self,
        claims: &ClaimSet,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> TokenResult<AccessToken> {
        let key = self.keys.signing_key();
        let encoding_key = key
            .encoding_key()
            .ok_or_else(|| TokenError::SigningUnavailable(key.key_id().to_string()))?;

        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or(TokenError::LifetimeOutOfRange)?;
        let payload = TokenPayload {
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            claims: claims.clone(),
        };

        let mut header = Header::new(key.algorithm().jwt_algorithm());
        header.kid = Some(key.key_id().to_string());

        let token = encode(&header, &payload, encoding_key)?;

        Ok(AccessToken {
            token,
            key_id: key.key_id().to_string(),
            expires_at,
        })
    }

    /// Validate a token and recover its claims.
    ///
    /// The key is selected by the header's `kid`; no other key is tried.
    /// Expiry is enforced without leeway.
    ///
    /// # Errors
    ///
    /// Returns the reason the token was rejected.
    pub fn validate(&self, token: &str) -> Result<VerifiedToken, ValidationFailure> {
        let header = decode_header(token).map_err(|_| ValidationFailure::Malformed)?;
        let key_id = header.kid.as_deref().ok_or(ValidationFailure::Malformed)?;

        let Some(key) = self.keys.find_verification_key(key_id) else {
            debug!("Rejected token signed by unknown key {}", key_id);
            return Err(ValidationFailure::UnknownKey);
        };

        if header.alg != key.algorithm().jwt_algorithm() {
            debug!(
                "Rejected token with alg {:?} for {} key {}",
                header.alg,
                key.algorithm().as_str(),
                key_id
            );
            return Err(ValidationFailure::SignatureInvalid);
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<TokenPayload>(token, key.decoding_key(), &validation).map_err(|e| {
            let failure = classify(&e);
            debug!("Rejected token signed by {}: {}", key_id, failure);
            failure
        })?;

        let payload = data.claims;
        let issued_at =
            DateTime::from_timestamp(payload.iat, 0).ok_or(ValidationFailure::Malformed)?;
        let expires_at =
            DateTime::from_timestamp(payload.exp, 0).ok_or(ValidationFailure::Malformed)?;

        Ok(VerifiedToken {
            claims: payload.claims,
            key_id: key_id.to_string(),
            token_id: payload.jti,
            issued_at,
            expires_at,
        })
    }
}

fn classify(error: &JwtError) -> ValidationFailure {
    match error.kind() {
        ErrorKind::ExpiredSignature => ValidationFailure::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
            ValidationFailure::SignatureInvalid
        }
        ErrorKind::InvalidIssuer => ValidationFailure::IssuerMismatch,
        _ => ValidationFailure::Malformed,
    }
}
