//! Argon2id password verification with a server-side pepper.

use super::collaborators::{CollaboratorError, PasswordVerifier};
use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};
use async_trait::async_trait;
use std::fmt;

/// Verifies PHC-format Argon2 hashes of `password + pepper`.
///
/// Hashing runs on the blocking pool so it never stalls the runtime.
#[derive(Clone)]
pub struct Argon2PasswordVerifier {
    pepper: String,
}

impl Argon2PasswordVerifier {
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            pepper: pepper.into(),
        }
    }

    /// Hash a password with Argon2id and the pepper
    ///
    /// # Errors
    ///
    /// * `CollaboratorError::Hashing` - hashing failed
    pub fn hash_password(&self, password: &str) -> Result<String, CollaboratorError> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        Ok(Argon2::default()
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| CollaboratorError::Hashing)?
            .to_string())
    }
}

impl fmt::Debug for Argon2PasswordVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argon2PasswordVerifier")
            .field("pepper", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl PasswordVerifier for Argon2PasswordVerifier {
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, CollaboratorError> {
        let peppered = format!("{}{}", password, self.pepper);
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&hash) else {
                log::warn!("Stored password hash is not a PHC string");
                return false;
            };
            Argon2::default()
                .verify_password(peppered.as_bytes(), &parsed)
                .is_ok()
        })
        .await
        .map_err(|e| CollaboratorError::Other(e.into()))
    }
}
