//! Refresh token error types.

use crate::cancel::Cancelled;
use thiserror::Error;

/// Refresh token errors
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Storage error
    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    /// No record for the presented payload
    #[error("Refresh token not found")]
    NotFound,

    /// Record is past its expiry
    #[error("Refresh token expired")]
    Expired,

    /// Record was revoked
    #[error("Refresh token revoked")]
    Revoked,

    /// A payload replaced by an earlier rotation was presented again
    #[error("Refresh token reuse detected")]
    ReuseDetected,

    /// A concurrent exchange rotated the payload first. Only the payload the
    /// winning exchange returned is usable now.
    #[error("Refresh token already rotated")]
    AlreadyRotated,

    /// Record belongs to another user
    #[error("Refresh token owner mismatch")]
    OwnerMismatch,

    /// Record is bound to another device
    #[error("Refresh token device mismatch")]
    DeviceMismatch,

    /// Refresh tokens are turned off for this deployment
    #[error("Refresh tokens are disabled")]
    Disabled,

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl RefreshError {
    /// The client must sign in again; retrying with the same payload cannot succeed
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            RefreshError::NotFound
                | RefreshError::Expired
                | RefreshError::Revoked
                | RefreshError::ReuseDetected
                | RefreshError::AlreadyRotated
                | RefreshError::OwnerMismatch
                | RefreshError::DeviceMismatch
                | RefreshError::Disabled
        )
    }

    /// The failure may clear on retry with the same payload
    pub fn is_transient(&self) -> bool {
        matches!(self, RefreshError::Storage(_) | RefreshError::Cancelled)
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Every rejected payload reads the same to the client.
    pub fn client_message(&self) -> String {
        match self {
            RefreshError::Storage(_) => "Internal server error".to_string(),
            RefreshError::Cancelled => "Please try again".to_string(),
            RefreshError::Disabled => self.to_string(),
            _ => "Invalid refresh token".to_string(),
        }
    }
}

impl From<Cancelled> for RefreshError {
    fn from(_: Cancelled) -> Self {
        RefreshError::Cancelled
    }
}

/// Result type for refresh token operations
pub type RefreshResult<T> = Result<T, RefreshError>;
