//! Access tokens.
//!
//! Tokens are JWTs whose header names the signing key by `kid`, so validation
//! resolves exactly one key and never tries the others. Validation failures
//! are returned as [`ValidationFailure`] values.
//!
//! ## Example
//!
//! ```
//! use authgate::keys::{KeyManager, SigningKeyPair};
//! use authgate::token::{ClaimSet, Role, TokenCodec};
//! use chrono::Duration;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! let key = SigningKeyPair::symmetric(&[9u8; 32]).unwrap();
//! let keys = Arc::new(KeyManager::new(key, Vec::new()).unwrap());
//! let codec = TokenCodec::new(keys, "https://auth.example.com");
//!
//! let claims = ClaimSet::builder(Uuid::new_v4(), Role::Member).build();
//! let token = codec.encode(&claims, Duration::minutes(15)).unwrap();
//! assert_eq!(codec.validate(&token.token).unwrap().claims, claims);
//! ```

pub mod claims;
pub mod codec;
pub mod errors;
pub mod models;

pub use claims::{ClaimSet, ClaimSetBuilder, ClaimValue, RESERVED_CLAIMS, Role};
pub use codec::TokenCodec;
pub use errors::{TokenError, TokenResult, ValidationFailure};
pub use models::{AccessToken, VerifiedToken};
