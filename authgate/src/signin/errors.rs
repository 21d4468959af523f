//! Sign-in error types.
//!
//! Credential rejections are [`AuthOutcome`](super::AuthOutcome) variants, not
//! errors. These cover the pipeline failing to reach an outcome at all.

use super::collaborators::CollaboratorError;
use crate::cancel::Cancelled;
use thiserror::Error;

/// Sign-in pipeline errors
#[derive(Debug, Error)]
pub enum SignInError {
    /// Caller cancelled the sign-in
    #[error("Sign-in cancelled")]
    Cancelled,

    /// A collaborator failed
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
}

impl SignInError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            SignInError::Cancelled => "Request cancelled".to_string(),
            SignInError::Collaborator(_) => "Internal server error".to_string(),
        }
    }
}

impl From<Cancelled> for SignInError {
    fn from(_: Cancelled) -> Self {
        SignInError::Cancelled
    }
}

/// Result type for sign-in operations
pub type SignInResult<T> = Result<T, SignInError>;
