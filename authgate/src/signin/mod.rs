//! Sign-in orchestration.
//!
//! Turns raw credentials into one [`AuthOutcome`]:
//!
//! 1. Lookup: unknown login gives `NotFound`
//! 2. Email gate: unconfirmed address gives `EmailConfirmationRequired`
//! 3. Password: mismatch gives `Unauthorized`
//! 4. Two-factor gate: a code is dispatched and the outcome is `TwoFactorRequired`,
//!    or `Unauthorized` if the code could not be sent
//! 5. `Succeeded` with the resolved team
//!
//! The pipeline only moves forward. User storage, hashing, delivery and code
//! verification are [`collaborators`]; [`Argon2PasswordVerifier`] and
//! [`TotpVerifier`] are ready-made implementations of two of them.

pub mod collaborators;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod password;
pub mod totp;

pub use collaborators::{
    CollaboratorError, DispatchError, DispatchReceipt, OtpDispatcher, PasswordVerifier,
    TwoFactorVerifier, UserDirectory,
};
pub use errors::{SignInError, SignInResult};
pub use models::{
    AuthOutcome, DISPATCH_FAILED, INVALID_LOGIN, LoginIdentifier, SignInRequest, Team,
    TwoFactorProvider, TwoFactorSettings, UserAccount,
};
pub use orchestrator::SignInOrchestrator;
pub use password::Argon2PasswordVerifier;
pub use totp::TotpVerifier;
