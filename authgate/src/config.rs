//! Token issuance configuration.
//!
//! Consolidates all environment variable reads and provides validated configuration.
//! Configuration errors are fatal: a process that cannot build an [`AuthConfig`]
//! must not serve traffic.

use crate::keys::KeyError;
use crate::refresh::RotationPolicy;
use chrono::Duration;
use std::fmt;

/// Complete token issuance configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Issuer written to and required in every access token
    pub issuer: String,
    /// Current and legacy signing keys
    pub signing: SigningKeyConfig,
    /// How long a demoted key stays valid for verification (None keeps it forever)
    pub legacy_key_retention: Option<Duration>,
    /// Lifetime of fully authenticated access tokens
    pub access_token_lifetime: Duration,
    /// Lifetime of access tokens issued while a second factor is pending
    pub two_factor_token_lifetime: Duration,
    /// Lifetime of refresh tokens
    pub refresh_token_lifetime: Duration,
    /// Refresh token rotation policy
    pub rotation_policy: RotationPolicy,
    /// Whether refresh tokens are issued at all
    pub refresh_tokens_enabled: bool,
    /// Revoke a refresh token when one of its replaced payloads is presented again
    pub revoke_on_reuse: bool,
    /// Window after a rotation in which the replaced payload counts as a lost race,
    /// not reuse
    pub reuse_interval: Duration,
}

/// Signing key material, current key first
#[derive(Clone)]
pub enum SigningKeyConfig {
    /// HS256 shared secrets
    Symmetric {
        secret: String,
        /// Most recent first
        legacy_secrets: Vec<String>,
    },
    /// RS256 key pair
    Rsa {
        private_key_pem: String,
        /// Public (or private) key PEMs, most recent first
        legacy_key_pems: Vec<String>,
    },
}

impl fmt::Debug for SigningKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningKeyConfig::Symmetric { legacy_secrets, .. } => f
                .debug_struct("Symmetric")
                .field("secret", &"<redacted>")
                .field("legacy_secrets", &legacy_secrets.len())
                .finish(),
            SigningKeyConfig::Rsa {
                legacy_key_pems, ..
            } => f
                .debug_struct("Rsa")
                .field("private_key_pem", &"<redacted>")
                .field("legacy_key_pems", &legacy_key_pems.len())
                .finish(),
        }
    }
}

impl AuthConfig {
    /// Build a configuration with default lifetimes and policy.
    pub fn new(issuer: impl Into<String>, signing: SigningKeyConfig) -> Self {
        Self {
            issuer: issuer.into(),
            signing,
            legacy_key_retention: None,
            access_token_lifetime: Duration::minutes(15),
            two_factor_token_lifetime: Duration::minutes(5),
            refresh_token_lifetime: Duration::days(7),
            rotation_policy: RotationPolicy::Always,
            refresh_tokens_enabled: true,
            revoke_on_reuse: true,
            reuse_interval: Duration::seconds(10),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `AUTH_ISSUER`: token issuer (required)
    /// - `AUTH_SIGNING_KEY_FILE`: RS256 private key PEM path
    /// - `AUTH_LEGACY_PUBLIC_KEY_FILES`: comma separated PEM paths, most recent first
    /// - `AUTH_SIGNING_SECRET`: HS256 secret, used when no key file is set
    /// - `AUTH_LEGACY_SIGNING_SECRETS`: comma separated, most recent first
    /// - `AUTH_LEGACY_KEY_RETENTION_SECS`: legacy verification window (default: unbounded)
    /// - `ACCESS_TOKEN_LIFETIME_SECS` (default: 900)
    /// - `TWO_FACTOR_TOKEN_LIFETIME_SECS` (default: 300)
    /// - `REFRESH_TOKEN_LIFETIME_DAYS` (default: 7)
    /// - `REFRESH_ROTATION_POLICY`: always, half-life, never-expire, disabled (default: always)
    /// - `REFRESH_TOKENS_ENABLED` (default: true)
    /// - `REFRESH_REVOKE_ON_REUSE` (default: true)
    /// - `REFRESH_REUSE_INTERVAL_SECS` (default: 10)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let issuer = lookup("AUTH_ISSUER")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                var: "AUTH_ISSUER".to_string(),
                hint: "Set to the public URL of this service".to_string(),
            })?;

        let signing = if let Some(path) = lookup("AUTH_SIGNING_KEY_FILE") {
            let legacy_key_pems = split_list(lookup("AUTH_LEGACY_PUBLIC_KEY_FILES"))
                .iter()
                .map(|p| read_key_file(p))
                .collect::<Result<Vec<_>, _>>()?;
            SigningKeyConfig::Rsa {
                private_key_pem: read_key_file(&path)?,
                legacy_key_pems,
            }
        } else if let Some(secret) = lookup("AUTH_SIGNING_SECRET") {
            SigningKeyConfig::Symmetric {
                secret,
                legacy_secrets: split_list(lookup("AUTH_LEGACY_SIGNING_SECRETS")),
            }
        } else {
            return Err(ConfigError::MissingRequired {
                var: "AUTH_SIGNING_KEY_FILE or AUTH_SIGNING_SECRET".to_string(),
                hint: "Generate with: openssl genpkey -algorithm RSA -out key.pem \
                       (or openssl rand -hex 32 for a shared secret)"
                    .to_string(),
            });
        };

        let rotation_policy = match lookup("REFRESH_ROTATION_POLICY") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var: "REFRESH_ROTATION_POLICY".to_string(),
                reason: format!(
                    "Unknown policy '{value}', expected always, half-life, never-expire or disabled"
                ),
            })?,
            None => RotationPolicy::Always,
        };

        let config = Self {
            issuer,
            signing,
            legacy_key_retention: lookup("AUTH_LEGACY_KEY_RETENTION_SECS")
                .map(|value| seconds("AUTH_LEGACY_KEY_RETENTION_SECS", &value))
                .transpose()?,
            access_token_lifetime: seconds_or(&lookup, "ACCESS_TOKEN_LIFETIME_SECS", 900)?,
            two_factor_token_lifetime: seconds_or(&lookup, "TWO_FACTOR_TOKEN_LIFETIME_SECS", 300)?,
            refresh_token_lifetime: days_or(&lookup, "REFRESH_TOKEN_LIFETIME_DAYS", 7)?,
            rotation_policy,
            refresh_tokens_enabled: flag_or(&lookup, "REFRESH_TOKENS_ENABLED", true)?,
            revoke_on_reuse: flag_or(&lookup, "REFRESH_REVOKE_ON_REUSE", true)?,
            reuse_interval: seconds_or(&lookup, "REFRESH_REUSE_INTERVAL_SECS", 10)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "AUTH_ISSUER".to_string(),
                hint: "Set to the public URL of this service".to_string(),
            });
        }

        if self.access_token_lifetime <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_LIFETIME_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        // Keeps `now + lifetime` representable wherever it is computed
        let bounded = [
            ("ACCESS_TOKEN_LIFETIME_SECS", Some(self.access_token_lifetime)),
            ("TWO_FACTOR_TOKEN_LIFETIME_SECS", Some(self.two_factor_token_lifetime)),
            ("REFRESH_TOKEN_LIFETIME_DAYS", Some(self.refresh_token_lifetime)),
            ("REFRESH_REUSE_INTERVAL_SECS", Some(self.reuse_interval)),
            ("AUTH_LEGACY_KEY_RETENTION_SECS", self.legacy_key_retention),
        ];
        for (var, value) in bounded {
            if value.is_some_and(|d| d > max_lifetime()) {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: format!("Must not exceed {MAX_LIFETIME_DAYS} days"),
                });
            }
        }

        if self.two_factor_token_lifetime <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "TWO_FACTOR_TOKEN_LIFETIME_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.two_factor_token_lifetime > self.access_token_lifetime {
            return Err(ConfigError::Invalid {
                var: "TWO_FACTOR_TOKEN_LIFETIME_SECS".to_string(),
                reason: format!(
                    "Must not exceed the access token lifetime ({}s)",
                    self.access_token_lifetime.num_seconds()
                ),
            });
        }

        if self.refresh_token_lifetime <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "REFRESH_TOKEN_LIFETIME_DAYS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.reuse_interval < Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "REFRESH_REUSE_INTERVAL_SECS".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        if let Some(retention) = self.legacy_key_retention {
            if retention < self.access_token_lifetime {
                return Err(ConfigError::Invalid {
                    var: "AUTH_LEGACY_KEY_RETENTION_SECS".to_string(),
                    reason: "Must cover at least one access token lifetime".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error("Invalid signing key configuration: {0}")]
    Key(#[from] KeyError),
}

fn read_key_file(path: &str) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| {
        ConfigError::Key(KeyError::Io {
            path: path.to_string(),
            source,
        })
    })
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Upper bound for every configured lifetime and window
pub const MAX_LIFETIME_DAYS: i64 = 36_500;

fn max_lifetime() -> Duration {
    Duration::days(MAX_LIFETIME_DAYS)
}

fn parse_number(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var: key.to_string(),
        reason: format!("'{value}' is not a whole number"),
    })
}

fn out_of_range(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        var: key.to_string(),
        reason: format!("'{value}' is out of range"),
    }
}

fn seconds(key: &str, value: &str) -> Result<Duration, ConfigError> {
    Duration::try_seconds(parse_number(key, value)?).ok_or_else(|| out_of_range(key, value))
}

fn days(key: &str, value: &str) -> Result<Duration, ConfigError> {
    Duration::try_days(parse_number(key, value)?).ok_or_else(|| out_of_range(key, value))
}

/// Seconds variable, `default` when unset
fn seconds_or<F>(lookup: &F, key: &str, default: i64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => seconds(key, &value),
        None => Ok(Duration::seconds(default)),
    }
}

/// Days variable, `default` when unset
fn days_or<F>(lookup: &F, key: &str, default: i64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => days(key, &value),
        None => Ok(Duration::days(default)),
    }
}

/// Boolean variable: true/false, 1/0, yes/no or on/off
fn flag_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var: key.to_string(),
            reason: format!("'{value}' is not a boolean, expected true or false"),
        }),
    }
}
