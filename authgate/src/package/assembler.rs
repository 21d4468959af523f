//! Token package assembly.

use super::{
    errors::PackageResult,
    models::{TokenPackage, TwoFactorChallenge},
};
use crate::{
    config::AuthConfig,
    db::RefreshTokenStore,
    keys::KeyManager,
    refresh::{IssuedRefreshToken, RefreshError, RefreshTokenService, Rotation, RotationPolicy},
    signin::{AuthOutcome, Team, TwoFactorProvider, UserAccount},
    token::{ClaimSet, TokenCodec},
};
use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builds [`TokenPackage`]s from sign-in outcomes and refresh exchanges
#[derive(Debug, Clone)]
pub struct TokenPackageAssembler {
    codec: TokenCodec,
    refresh: RefreshTokenService,
    access_token_lifetime: Duration,
    two_factor_token_lifetime: Duration,
    refresh_tokens_enabled: bool,
    rotation_policy: RotationPolicy,
}

impl TokenPackageAssembler {
    /// Create an assembler with 15 minute access tokens, 5 minute two-factor
    /// tokens, refresh tokens enabled and the refresh service's policy
    pub fn new(codec: TokenCodec, refresh: RefreshTokenService) -> Self {
        let rotation_policy = refresh.policy();
        Self {
            codec,
            refresh,
            access_token_lifetime: Duration::minutes(15),
            two_factor_token_lifetime: Duration::minutes(5),
            refresh_tokens_enabled: true,
            rotation_policy,
        }
    }

    /// Wire codec, refresh service and lifetimes from configuration
    pub fn from_config(
        config: &AuthConfig,
        keys: Arc<KeyManager>,
        store: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        let codec = TokenCodec::new(keys, config.issuer.clone());
        let refresh = RefreshTokenService::from_config(store, config);
        Self::new(codec, refresh)
            .with_access_token_lifetime(config.access_token_lifetime)
            .with_two_factor_token_lifetime(config.two_factor_token_lifetime)
            .with_refresh_tokens_enabled(config.refresh_tokens_enabled)
    }

    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    pub fn with_two_factor_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.two_factor_token_lifetime = lifetime;
        self
    }

    pub fn with_refresh_tokens_enabled(mut self, enabled: bool) -> Self {
        self.refresh_tokens_enabled = enabled;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn refresh_service(&self) -> &RefreshTokenService {
        &self.refresh
    }

    /// Package for a user who still owes a second factor.
    ///
    /// The access token carries the pending provider and no team; a refresh
    /// token is never attached.
    ///
    /// # Errors
    ///
    /// * `PackageError::Token` - signing failed
    pub fn assemble_for_two_factor_required(
        &self,
        user: &UserAccount,
        provider: TwoFactorProvider,
        extra_info: Option<&str>,
    ) -> PackageResult<TokenPackage> {
        let claims = ClaimSet::builder(user.id, user.role)
            .two_factor_pending(provider)
            .build();
        let access_token = self
            .codec
            .encode(&claims, self.two_factor_token_lifetime)?;

        Ok(TokenPackage {
            access_token,
            refresh_token: None,
            challenge: Some(TwoFactorChallenge {
                provider,
                extra_info: extra_info.map(str::to_string),
            }),
        })
    }

    /// Package for a fully authenticated user.
    ///
    /// A refresh token is attached only when refresh tokens are enabled.
    ///
    /// # Errors
    ///
    /// * `PackageError::Token` - signing failed
    /// * `PackageError::Refresh` - the refresh token could not be stored
    pub async fn assemble_for_success(
        &self,
        user: &UserAccount,
        team: Option<&Team>,
        device_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> PackageResult<TokenPackage> {
        let access_token = self.encode_full(user, team, device_id)?;

        let refresh_token = if self.refresh_tokens_enabled {
            Some(self.refresh.issue(user.id, device_id, cancel).await?)
        } else {
            None
        };

        Ok(TokenPackage {
            access_token,
            refresh_token,
            challenge: None,
        })
    }

    /// Package for a refresh token exchange.
    ///
    /// The presented token must belong to `user` and be active; it is then
    /// rotated per policy. When the policy keeps the payload, the package carries
    /// the presented payload again. The second factor is not re-checked.
    ///
    /// # Errors
    ///
    /// * `PackageError::Refresh` - disabled, rejected, reused, or lost a rotation race
    /// * `PackageError::Token` - signing failed
    pub async fn assemble_for_refresh_exchange(
        &self,
        raw: &str,
        user: &UserAccount,
        team: Option<&Team>,
        device_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> PackageResult<TokenPackage> {
        if !self.refresh_tokens_enabled {
            return Err(RefreshError::Disabled.into());
        }

        let rotation = self
            .refresh
            .exchange(raw, user.id, device_id, self.rotation_policy, cancel)
            .await?;

        let device_id = device_id.or(rotation.record().device_id.as_deref());
        let access_token = self.encode_full(user, team, device_id)?;

        let refresh_token = match rotation {
            Rotation::Rotated(issued) => issued,
            Rotation::Unchanged(record) => IssuedRefreshToken::new(raw.to_string(), record),
        };

        Ok(TokenPackage {
            access_token,
            refresh_token: Some(refresh_token),
            challenge: None,
        })
    }

    /// Package for any sign-in outcome; `None` for the three failure outcomes
    ///
    /// # Errors
    ///
    /// Same as the `assemble_for_*` method the outcome maps to.
    pub async fn assemble_for_outcome(
        &self,
        outcome: &AuthOutcome,
        device_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> PackageResult<Option<TokenPackage>> {
        match outcome {
            AuthOutcome::NotFound
            | AuthOutcome::EmailConfirmationRequired { .. }
            | AuthOutcome::Unauthorized { .. } => Ok(None),
            AuthOutcome::TwoFactorRequired {
                user,
                provider,
                extra_info,
            } => self
                .assemble_for_two_factor_required(user, *provider, extra_info.as_deref())
                .map(Some),
            AuthOutcome::Succeeded { user, team } => self
                .assemble_for_success(user, team.as_ref(), device_id, cancel)
                .await
                .map(Some),
        }
    }

    fn encode_full(
        &self,
        user: &UserAccount,
        team: Option<&Team>,
        device_id: Option<&str>,
    ) -> PackageResult<crate::token::AccessToken> {
        // A user enrolled in two-factor only reaches here after presenting it
        let claims = ClaimSet::builder(user.id, user.role)
            .team(team.map(|t| t.id))
            .device(device_id.map(str::to_string))
            .two_factor_verified(user.has_two_factor())
            .build();
        Ok(self.codec.encode(&claims, self.access_token_lifetime)?)
    }
}
