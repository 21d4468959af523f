//! TOTP second factor (RFC 6238, SHA-1, 6 digits, 30 second step).

use super::{
    collaborators::{CollaboratorError, TwoFactorVerifier},
    models::{TwoFactorProvider, UserAccount},
};
use async_trait::async_trait;
use totp_rs::{Algorithm, Secret, TOTP};

/// Verifies codes against the user's enrolled TOTP secret, accepting one step of skew
#[derive(Debug, Clone, Copy, Default)]
pub struct TotpVerifier;

impl TotpVerifier {
    fn totp(secret: &str) -> Result<TOTP, CollaboratorError> {
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| CollaboratorError::Other(anyhow::anyhow!("invalid TOTP secret: {e:?}")))?;
        TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes)
            .map_err(|e| CollaboratorError::Other(anyhow::anyhow!("invalid TOTP secret: {e}")))
    }

    /// Code for the current time step, for dispatchers that deliver TOTP codes
    /// by email or SMS
    ///
    /// # Errors
    ///
    /// Returns error if the secret is not valid base32 or shorter than 128 bits
    pub fn current_code(secret: &str) -> Result<String, CollaboratorError> {
        Self::totp(secret)?
            .generate_current()
            .map_err(|e| CollaboratorError::Other(e.into()))
    }
}

#[async_trait]
impl TwoFactorVerifier for TotpVerifier {
    async fn verify(
        &self,
        user: &UserAccount,
        provider: TwoFactorProvider,
        code: &str,
    ) -> Result<bool, CollaboratorError> {
        let Some(secret) = user
            .two_factor
            .as_ref()
            .and_then(|settings| settings.totp_secret.as_deref())
        else {
            log::warn!("User {} has no TOTP secret for {}", user.id, provider);
            return Ok(false);
        };

        Self::totp(secret)?
            .check_current(code.trim())
            .map_err(|e| CollaboratorError::Other(e.into()))
    }
}
