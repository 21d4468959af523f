//! Interfaces to the systems the sign-in pipeline consults.
//!
//! User storage, password hashing, code delivery and code verification belong
//! to other services. Each is a trait here so deployments and tests can plug in
//! their own.

use super::models::{LoginIdentifier, Team, TwoFactorProvider, UserAccount};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Infrastructure failure inside a collaborator
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    Hashing,

    /// Downstream service unreachable
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One-time code delivery failure
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Transport rejected or lost the message
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// No transport configured for the provider
    #[error("No transport configured for {0}")]
    ProviderUnavailable(TwoFactorProvider),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Result of a successful code dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Hint for the client, e.g. the masked destination
    pub extra_info: Option<String>,
}

/// User and team lookups
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by email, user name or id
    async fn find_user(
        &self,
        login: &LoginIdentifier,
    ) -> Result<Option<UserAccount>, CollaboratorError>;

    /// Pick the team the session is scoped to, honoring `requested` when the
    /// user may use it
    async fn resolve_team(
        &self,
        user: &UserAccount,
        requested: Option<Uuid>,
    ) -> Result<Option<Team>, CollaboratorError>;

    /// Note a completed sign-in (last login timestamp and similar)
    async fn record_sign_in(&self, _user: &UserAccount) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Password hash verification
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    /// Whether `password` matches `hash`
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, CollaboratorError>;
}

/// One-time code delivery
#[async_trait]
pub trait OtpDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        user: &UserAccount,
        provider: TwoFactorProvider,
    ) -> Result<DispatchReceipt, DispatchError>;
}

/// Second factor verification
#[async_trait]
pub trait TwoFactorVerifier: Send + Sync {
    async fn verify(
        &self,
        user: &UserAccount,
        provider: TwoFactorProvider,
        code: &str,
    ) -> Result<bool, CollaboratorError>;
}
