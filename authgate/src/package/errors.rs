//! Token package error types.

use crate::{refresh::RefreshError, token::TokenError};
use thiserror::Error;

/// Errors raised while assembling a token package
#[derive(Debug, Error)]
pub enum PackageError {
    /// Access token could not be signed
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Refresh token could not be issued or exchanged
    #[error("Refresh token error: {0}")]
    Refresh(#[from] RefreshError),
}

impl PackageError {
    /// The client has to sign in again
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            PackageError::Refresh(e) => e.requires_reauthentication(),
            PackageError::Token(_) => false,
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            PackageError::Token(e) => e.client_message(),
            PackageError::Refresh(e) => e.client_message(),
        }
    }
}

/// Result type for package assembly
pub type PackageResult<T> = Result<T, PackageError>;
