//! Sign-in decision pipeline.

use super::{
    collaborators::{OtpDispatcher, PasswordVerifier, TwoFactorVerifier, UserDirectory},
    errors::SignInResult,
    models::{AuthOutcome, DISPATCH_FAILED, LoginIdentifier, SignInRequest, TwoFactorProvider},
};
use crate::cancel::until_cancelled;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runs lookup, email gate, password check and two-factor gate, in that order,
/// and returns exactly one [`AuthOutcome`].
///
/// Every collaborator call is raced against the caller's cancellation token.
#[derive(Clone)]
pub struct SignInOrchestrator {
    users: Arc<dyn UserDirectory>,
    passwords: Arc<dyn PasswordVerifier>,
    dispatcher: Arc<dyn OtpDispatcher>,
    second_factor: Arc<dyn TwoFactorVerifier>,
}

impl SignInOrchestrator {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        passwords: Arc<dyn PasswordVerifier>,
        dispatcher: Arc<dyn OtpDispatcher>,
        second_factor: Arc<dyn TwoFactorVerifier>,
    ) -> Self {
        Self {
            users,
            passwords,
            dispatcher,
            second_factor,
        }
    }

    /// Run the first sign-in step
    ///
    /// # Errors
    ///
    /// * `SignInError::Cancelled` - `cancel` fired before an outcome was reached
    /// * `SignInError::Collaborator` - lookup, hashing or team resolution failed
    pub async fn sign_in(
        &self,
        request: &SignInRequest,
        cancel: &CancellationToken,
    ) -> SignInResult<AuthOutcome> {
        let Some(user) = until_cancelled(cancel, self.users.find_user(&request.login)).await??
        else {
            log::debug!("Sign-in for unknown login");
            return Ok(AuthOutcome::NotFound);
        };

        if !user.email_confirmed {
            return Ok(AuthOutcome::EmailConfirmationRequired { email: user.email });
        }

        let password_ok = until_cancelled(
            cancel,
            self.passwords.verify(&request.password, &user.password_hash),
        )
        .await??;
        if !password_ok {
            log::debug!("Wrong password for user {}", user.id);
            return Ok(AuthOutcome::Unauthorized { reason: None });
        }

        if let Some(provider) = user.two_factor_provider() {
            let extra_info = if provider.requires_dispatch() {
                match until_cancelled(cancel, self.dispatcher.dispatch(&user, provider)).await? {
                    Ok(receipt) => receipt.extra_info,
                    Err(e) => {
                        log::warn!(
                            "Failed to send {} verification code to user {}: {}",
                            provider,
                            user.id,
                            e
                        );
                        return Ok(AuthOutcome::Unauthorized {
                            reason: Some(DISPATCH_FAILED.to_string()),
                        });
                    }
                }
            } else {
                None
            };

            log::info!("User {} passed password check, awaiting {} code", user.id, provider);
            return Ok(AuthOutcome::TwoFactorRequired {
                user,
                provider,
                extra_info,
            });
        }

        let team =
            until_cancelled(cancel, self.users.resolve_team(&user, request.team_id)).await??;
        until_cancelled(cancel, self.users.record_sign_in(&user)).await??;

        log::info!("User {} signed in", user.id);
        Ok(AuthOutcome::Succeeded { user, team })
    }

    /// Run the second step after a `TwoFactorRequired` outcome.
    ///
    /// An unknown user gives `NotFound`; a provider other than the enrolled one
    /// or a wrong code gives `Unauthorized`.
    ///
    /// # Errors
    ///
    /// * `SignInError::Cancelled` - `cancel` fired before an outcome was reached
    /// * `SignInError::Collaborator` - lookup, verification or team resolution failed
    pub async fn complete_two_factor(
        &self,
        user_id: Uuid,
        provider: TwoFactorProvider,
        code: &str,
        team_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> SignInResult<AuthOutcome> {
        let login = LoginIdentifier::Id(user_id);
        let Some(user) = until_cancelled(cancel, self.users.find_user(&login)).await?? else {
            return Ok(AuthOutcome::NotFound);
        };

        if user.two_factor_provider() != Some(provider) {
            log::warn!(
                "User {} presented a {} code but is not enrolled with it",
                user.id,
                provider
            );
            return Ok(AuthOutcome::Unauthorized { reason: None });
        }

        let verified =
            until_cancelled(cancel, self.second_factor.verify(&user, provider, code)).await??;
        if !verified {
            log::debug!("Wrong {} code for user {}", provider, user.id);
            return Ok(AuthOutcome::Unauthorized { reason: None });
        }

        let team = until_cancelled(cancel, self.users.resolve_team(&user, team_id)).await??;
        until_cancelled(cancel, self.users.record_sign_in(&user)).await??;

        log::info!("User {} signed in with {}", user.id, provider);
        Ok(AuthOutcome::Succeeded { user, team })
    }
}

impl std::fmt::Debug for SignInOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInOrchestrator").finish_non_exhaustive()
    }
}
