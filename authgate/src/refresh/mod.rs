//! Refresh tokens.
//!
//! A refresh token is an opaque random payload handed to the client once. Only
//! its SHA-256 hash is stored, in a [`RefreshToken`] record that also remembers
//! the hash it replaced at the last rotation so replays can be detected.
//!
//! Rotation is a compare-and-swap on the stored hash: of two concurrent
//! exchanges of one payload exactly one wins, the other gets
//! [`RefreshError::AlreadyRotated`].
//!
//! ## Example
//!
//! ```
//! use authgate::refresh::{
//!     InMemoryRefreshTokenStore, RefreshTokenService, Rotation, RotationPolicy,
//! };
//! use chrono::Duration;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryRefreshTokenStore::new());
//! let service = RefreshTokenService::new(store, Duration::days(7));
//! let cancel = CancellationToken::new();
//! let user = Uuid::new_v4();
//!
//! let issued = service.issue(user, None, &cancel).await?;
//! let rotation = service
//!     .exchange(issued.payload(), user, None, RotationPolicy::Always, &cancel)
//!     .await?;
//! assert!(matches!(rotation, Rotation::Rotated(_)));
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod exchange;
pub mod memory;
pub mod models;
pub mod service;

pub use errors::{RefreshError, RefreshResult};
pub use exchange::{ExchangeCheck, RefreshRejection, ValidatedExchange, validate_exchange};
pub use memory::InMemoryRefreshTokenStore;
pub use models::{
    IssuedRefreshToken, NEVER_EXPIRE_HORIZON_DAYS, PAYLOAD_BYTES, PayloadReplacement,
    RefreshToken, Rotation, RotationPolicy, UnknownPolicy, generate_payload, hash_payload,
};
pub use service::RefreshTokenService;
