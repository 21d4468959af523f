//! Sign-in data models.

use crate::token::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generic message for every credential rejection
pub const INVALID_LOGIN: &str = "Invalid login";

/// Reason attached to `Unauthorized` when a one-time code could not be delivered
pub const DISPATCH_FAILED: &str = "Unable to send verification code";

/// Channel delivering the second factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorProvider {
    /// TOTP app; nothing is sent
    Authenticator,
    Email,
    Sms,
}

impl TwoFactorProvider {
    /// Whether a code has to be delivered to the user
    pub fn requires_dispatch(self) -> bool {
        !matches!(self, TwoFactorProvider::Authenticator)
    }
}

impl fmt::Display for TwoFactorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TwoFactorProvider::Authenticator => "authenticator",
            TwoFactorProvider::Email => "email",
            TwoFactorProvider::Sms => "sms",
        })
    }
}

/// Two-factor enrollment of a user
#[derive(Clone, PartialEq, Eq)]
pub struct TwoFactorSettings {
    pub provider: TwoFactorProvider,
    /// Base32 TOTP secret for the authenticator provider
    pub totp_secret: Option<String>,
}

impl fmt::Debug for TwoFactorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoFactorSettings")
            .field("provider", &self.provider)
            .field("totp_secret", &self.totp_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// User as seen by the sign-in pipeline
#[derive(Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub user_name: String,
    pub email_confirmed: bool,
    /// PHC-format password hash
    pub password_hash: String,
    pub role: Role,
    pub two_factor: Option<TwoFactorSettings>,
}

impl UserAccount {
    pub fn two_factor_provider(&self) -> Option<TwoFactorProvider> {
        self.two_factor.as_ref().map(|settings| settings.provider)
    }

    pub fn has_two_factor(&self) -> bool {
        self.two_factor.is_some()
    }
}

impl fmt::Debug for UserAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAccount")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("user_name", &self.user_name)
            .field("email_confirmed", &self.email_confirmed)
            .field("role", &self.role)
            .field("two_factor", &self.two_factor)
            .finish_non_exhaustive()
    }
}

/// Team (tenant) a session is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
}

/// How the user identified themselves
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoginIdentifier {
    Email(String),
    UserName(String),
    Id(Uuid),
}

impl LoginIdentifier {
    /// Classify raw login input: a UUID is an id, anything with `@` an email
    /// (lowercased), the rest a user name.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Ok(id) = Uuid::parse_str(input) {
            LoginIdentifier::Id(id)
        } else if input.contains('@') {
            LoginIdentifier::Email(input.to_lowercase())
        } else {
            LoginIdentifier::UserName(input.to_string())
        }
    }
}

/// First-step credentials
#[derive(Clone)]
pub struct SignInRequest {
    pub login: LoginIdentifier,
    pub password: String,
    /// Team the client wants the session scoped to
    pub team_id: Option<Uuid>,
}

impl SignInRequest {
    pub fn new(login: &str, password: impl Into<String>) -> Self {
        Self {
            login: LoginIdentifier::parse(login),
            password: password.into(),
            team_id: None,
        }
    }

    pub fn with_team(mut self, team_id: Uuid) -> Self {
        self.team_id = Some(team_id);
        self
    }
}

impl fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInRequest")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("team_id", &self.team_id)
            .finish()
    }
}

/// Terminal result of the sign-in pipeline. Exactly one variant applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    NotFound,
    EmailConfirmationRequired {
        email: String,
    },
    Unauthorized {
        reason: Option<String>,
    },
    TwoFactorRequired {
        user: UserAccount,
        provider: TwoFactorProvider,
        /// Provider hint for the client, e.g. a masked phone number
        extra_info: Option<String>,
    },
    Succeeded {
        user: UserAccount,
        team: Option<Team>,
    },
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Succeeded { .. })
    }

    /// Message safe to show the client.
    ///
    /// Unknown users and wrong passwords read the same.
    pub fn client_message(&self) -> String {
        match self {
            AuthOutcome::NotFound | AuthOutcome::Unauthorized { reason: None } => {
                INVALID_LOGIN.to_string()
            }
            AuthOutcome::Unauthorized {
                reason: Some(reason),
            } => reason.clone(),
            AuthOutcome::EmailConfirmationRequired { .. } => {
                "Email confirmation required".to_string()
            }
            AuthOutcome::TwoFactorRequired { .. } => "Verification code required".to_string(),
            AuthOutcome::Succeeded { .. } => "Signed in".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_identifier_parse() {
        let id = Uuid::new_v4();
        assert_eq!(LoginIdentifier::parse(&id.to_string()), LoginIdentifier::Id(id));
        assert_eq!(
            LoginIdentifier::parse(" Alice@Example.COM "),
            LoginIdentifier::Email("alice@example.com".to_string())
        );
        assert_eq!(
            LoginIdentifier::parse("alice"),
            LoginIdentifier::UserName("alice".to_string())
        );
    }

    #[test]
    fn test_not_found_and_wrong_password_look_alike() {
        assert_eq!(
            AuthOutcome::NotFound.client_message(),
            AuthOutcome::Unauthorized { reason: None }.client_message()
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let request = SignInRequest::new("alice", "hunter2-password");
        assert!(!format!("{request:?}").contains("hunter2"));

        let user = UserAccount {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            user_name: "alice".to_string(),
            email_confirmed: true,
            password_hash: "$argon2id$v=19$secret-hash".to_string(),
            role: Role::Member,
            two_factor: Some(TwoFactorSettings {
                provider: TwoFactorProvider::Authenticator,
                totp_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
            }),
        };
        let debug = format!("{user:?}");
        assert!(!debug.contains("secret-hash"));
        assert!(!debug.contains("JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn test_only_authenticator_skips_dispatch() {
        assert!(!TwoFactorProvider::Authenticator.requires_dispatch());
        assert!(TwoFactorProvider::Email.requires_dispatch());
        assert!(TwoFactorProvider::Sms.requires_dispatch());
    }
}
