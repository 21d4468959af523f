//! Token packages: the access token plus, when allowed, a refresh token.
//!
//! A package built for a pending second factor never carries a refresh token.
//! A package built for a completed sign-in carries one only when refresh tokens
//! are enabled for the deployment.

pub mod assembler;
pub mod errors;
pub mod models;

pub use assembler::TokenPackageAssembler;
pub use errors::{PackageError, PackageResult};
pub use models::{TokenPackage, TokenResponse, TwoFactorChallenge};
