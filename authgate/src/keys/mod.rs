//! Signing key management.
//!
//! One current key signs new access tokens; legacy keys, most recently demoted
//! first, stay available for verification until they are pruned. Every key is
//! addressed by an id derived from its public material:
//!
//! - RSA keys: SHA-256 of the DER SubjectPublicKeyInfo
//! - Shared secrets: SHA-256 of the secret's SHA-256 fingerprint
//!
//! ## Example
//!
//! ```
//! use authgate::keys::{KeyManager, SigningKeyPair};
//!
//! let current = SigningKeyPair::symmetric(&[7u8; 32]).unwrap();
//! let manager = KeyManager::new(current, Vec::new()).unwrap();
//!
//! manager.rotate(SigningKeyPair::symmetric(&[8u8; 32]).unwrap()).unwrap();
//! assert_eq!(manager.verification_keys().len(), 2);
//! ```

pub mod errors;
pub mod kid;
pub mod manager;
pub mod models;

pub use errors::{KeyError, KeyResult};
pub use kid::derive_key_id;
pub use manager::KeyManager;
pub use models::{KeyAlgorithm, MIN_SECRET_LEN, PublicKeyExport, PublicKeySet, SigningKeyPair};
