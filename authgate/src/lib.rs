//! # authgate
//!
//! Access token issuance and sign-in orchestration.
//!
//! Sign-in runs as a forward-only pipeline that ends in one [`AuthOutcome`].
//! Successful outcomes are turned into a [`TokenPackage`]: a short-lived JWT
//! access token plus, when enabled, an opaque refresh token.
//!
//! ## Core Modules
//!
//! - [`keys`]: current and legacy signing keys, key ids, rotation, public key export
//! - [`token`]: claim sets, JWT encoding and `kid`-directed validation
//! - [`refresh`]: refresh token issue, rotation policies, reuse detection, revocation
//! - [`signin`]: the sign-in decision pipeline and its collaborator traits
//! - [`package`]: assembles token packages from outcomes and refresh exchanges
//! - [`db`]: Postgres pool, migrations and the refresh token store
//! - [`config`]: environment-driven configuration
//!
//! ## Example
//!
//! ```
//! use authgate::{
//!     AuthConfig, SigningKeyConfig, KeyManager, TokenPackageAssembler,
//!     refresh::InMemoryRefreshTokenStore,
//!     signin::UserAccount,
//!     token::Role,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new(
//!     "https://auth.example.com",
//!     SigningKeyConfig::Symmetric {
//!         secret: "an-example-secret-of-32-bytes-or-more".to_string(),
//!         legacy_secrets: Vec::new(),
//!     },
//! );
//! let keys = Arc::new(KeyManager::from_config(&config.signing)?);
//! let store = Arc::new(InMemoryRefreshTokenStore::new());
//! let assembler = TokenPackageAssembler::from_config(&config, keys, store);
//!
//! let user = UserAccount {
//!     id: Uuid::new_v4(),
//!     email: "ada@example.com".to_string(),
//!     user_name: "ada".to_string(),
//!     email_confirmed: true,
//!     password_hash: String::new(),
//!     role: Role::Owner,
//!     two_factor: None,
//! };
//! let package = assembler
//!     .assemble_for_success(&user, None, Some("laptop"), &CancellationToken::new())
//!     .await?;
//! assert!(package.has_refresh_token());
//!
//! let verified = assembler.codec().validate(&package.access_token.token)?;
//! assert_eq!(verified.claims.subject(), user.id);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod db;
pub mod keys;
pub mod package;
pub mod refresh;
pub mod signin;
pub mod token;

pub use cancel::{Cancelled, ensure_not_cancelled, until_cancelled};
pub use config::{AuthConfig, ConfigError, SigningKeyConfig};
pub use keys::{KeyError, KeyManager, PublicKeySet, SigningKeyPair, derive_key_id};
pub use package::{PackageError, TokenPackage, TokenPackageAssembler, TokenResponse};
pub use refresh::{RefreshError, RefreshTokenService, RotationPolicy};
pub use signin::{AuthOutcome, SignInError, SignInOrchestrator, SignInRequest};
pub use token::{ClaimSet, TokenCodec, ValidationFailure};
