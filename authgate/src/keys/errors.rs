//! Signing key error types.
//!
//! Every variant is a configuration problem: they surface while keys are loaded,
//! rotated or exported, never while a request is validated.

use thiserror::Error;

/// Signing key errors
#[derive(Debug, Error)]
pub enum KeyError {
    /// No signing key was configured
    #[error("No signing key configured")]
    MissingSigningKey,

    /// Symmetric secret shorter than the accepted minimum
    #[error("Signing secret too short: {len} bytes, at least {min} required")]
    SecretTooShort { len: usize, min: usize },

    /// Key material could not be parsed
    #[error("Malformed key material: {0}")]
    MalformedKeyMaterial(String),

    /// Key has no private half and cannot become the current key
    #[error("Key {0} has no private material and cannot sign")]
    NotSigningCapable(String),

    /// Two configured keys share an id
    #[error("Duplicate key id: {0}")]
    DuplicateKeyId(String),

    /// Key id not present in the ring
    #[error("Unknown key id: {0}")]
    UnknownKeyId(String),

    /// Symmetric keys have no public half to publish
    #[error("Key {0} is symmetric and cannot be exported")]
    NotExportable(String),

    /// Key file could not be read
    #[error("Failed to read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for key operations
pub type KeyResult<T> = Result<T, KeyError>;
