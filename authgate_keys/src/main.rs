//! Operator tool for authgate.
//!
//! Checks signing configuration, derives key ids, publishes the public key set,
//! inspects access tokens and revokes refresh tokens.

mod logging;

use std::sync::Arc;

use anyhow::{Context, Error, bail};
use authgate::{
    AuthConfig, KeyManager, RefreshTokenService, SigningKeyPair, TokenCodec,
    db::{Database, DatabaseConfig},
    token::{ClaimSet, Role},
};
use chrono::Duration;
use log::{info, warn};
use pico_args::Arguments;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const HELP: &str = "\
Manage authgate signing keys and tokens

USAGE:
  authgate_keys <COMMAND> [OPTIONS]

COMMANDS:
  check [--database]       Load the configuration, sign and verify a probe token
  kid --key-file PATH      Print the key id of an RSA key (private or public PEM)
  kid --secret-env VAR     Print the key id of the shared secret held in VAR
  jwks                     Print the public key set as JSON
  inspect TOKEN            Validate an access token and print its claims
  migrate                  Apply the refresh token schema
  revoke-user USER_ID      Revoke every refresh token of a user

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  AUTH_ISSUER              Issuer URL (required)
  AUTH_SIGNING_KEY_FILE    RSA private key (PEM), or
  AUTH_SIGNING_SECRET      Shared HS256 secret
  DATABASE_URL             PostgreSQL connection string (migrate, revoke-user, check --database)
  RUST_LOG                 Log filter [default: info,sqlx=warn]
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    logging::init();

    let Some(command) = pargs.subcommand()? else {
        print!("{HELP}");
        std::process::exit(2);
    };

    match command.as_str() {
        "check" => {
            let with_database = pargs.contains("--database");
            finish(pargs)?;
            check(with_database).await
        }
        "kid" => {
            let key_file: Option<String> = pargs.opt_value_from_str("--key-file")?;
            let secret_env: Option<String> = pargs.opt_value_from_str("--secret-env")?;
            finish(pargs)?;
            kid(key_file, secret_env)
        }
        "jwks" => {
            finish(pargs)?;
            jwks()
        }
        "inspect" => {
            let token: String = pargs.free_from_str()?;
            finish(pargs)?;
            inspect(&token)
        }
        "migrate" => {
            finish(pargs)?;
            migrate().await
        }
        "revoke-user" => {
            let user_id: Uuid = pargs.free_from_str()?;
            finish(pargs)?;
            revoke_user(user_id).await
        }
        other => bail!("Unknown command '{other}', see --help"),
    }
}

fn finish(pargs: Arguments) -> Result<(), Error> {
    let rest = pargs.finish();
    if !rest.is_empty() {
        bail!("Unexpected arguments: {rest:?}");
    }
    Ok(())
}

fn describe_lifetime(lifetime: Duration) -> String {
    match lifetime.num_seconds() {
        secs if secs % 86_400 == 0 => format!("{}d", secs / 86_400),
        secs if secs % 3_600 == 0 => format!("{}h", secs / 3_600),
        secs if secs % 60 == 0 => format!("{}m", secs / 60),
        secs => format!("{secs}s"),
    }
}

fn load_keys(config: &AuthConfig) -> Result<KeyManager, Error> {
    let keys = KeyManager::from_config(&config.signing).context("Failed to load signing keys")?;
    Ok(match config.legacy_key_retention {
        Some(retention) => keys.with_legacy_retention(retention),
        None => keys,
    })
}

async fn connect() -> Result<Database, Error> {
    let db_config = DatabaseConfig::from_env()?;
    let db = Database::new(&db_config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    info!("Database connected successfully");
    Ok(db)
}

async fn check(with_database: bool) -> Result<(), Error> {
    let config = AuthConfig::from_env()?;
    let keys = Arc::new(load_keys(&config)?);
    let current = keys.current_key_id();

    info!("Issuer: {}", config.issuer);
    for key in keys.verification_keys() {
        let role = if key.key_id() == current { "current" } else { "legacy" };
        info!(
            "  {} key {} ({}, can sign: {})",
            role,
            key.key_id(),
            key.algorithm().as_str(),
            key.can_sign()
        );
    }
    info!(
        "Access tokens: {}, two-factor tokens: {}, refresh tokens: {} ({}, policy {})",
        describe_lifetime(config.access_token_lifetime),
        describe_lifetime(config.two_factor_token_lifetime),
        if config.refresh_tokens_enabled { "enabled" } else { "disabled" },
        describe_lifetime(config.refresh_token_lifetime),
        config.rotation_policy
    );

    // Round-trip a probe token through the current key
    let codec = TokenCodec::new(keys, config.issuer.clone());
    let probe = ClaimSet::builder(Uuid::nil(), Role::Member).build();
    let token = codec.encode(&probe, config.access_token_lifetime)?;
    codec
        .validate(&token.token)
        .context("Probe token failed validation")?;
    info!("Probe token signed and verified with key {}", token.key_id);

    if with_database {
        let db = connect().await?;
        db.health_check().await.context("Database health check failed")?;
        info!("Database reachable");
        db.close().await;
    }

    println!("ok");
    Ok(())
}

fn kid(key_file: Option<String>, secret_env: Option<String>) -> Result<(), Error> {
    let key = match (key_file, secret_env) {
        (Some(path), None) => {
            let pem = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read key file {path}"))?;
            SigningKeyPair::rsa_from_pem(&pem)?
        }
        (None, Some(var)) => {
            let secret = std::env::var(&var).with_context(|| format!("{var} is not set"))?;
            SigningKeyPair::symmetric(secret.as_bytes())?
        }
        _ => bail!("Pass exactly one of --key-file or --secret-env"),
    };

    println!("{}", key.key_id());
    Ok(())
}

fn jwks() -> Result<(), Error> {
    let config = AuthConfig::from_env()?;
    let keys = load_keys(&config)?;
    let set = keys.public_keys();
    if set.keys.is_empty() {
        warn!("No publishable keys: shared secrets are never exported");
    }
    println!("{}", set.to_json_pretty()?);
    Ok(())
}

fn inspect(token: &str) -> Result<(), Error> {
    let config = AuthConfig::from_env()?;
    let codec = TokenCodec::new(Arc::new(load_keys(&config)?), config.issuer.clone());
    let verified = codec.validate(token).context("Token rejected")?;

    let body = serde_json::json!({
        "kid": verified.key_id,
        "jti": verified.token_id,
        "issued_at": verified.issued_at.to_rfc3339(),
        "expires_at": verified.expires_at.to_rfc3339(),
        "claims": verified.claims,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn migrate() -> Result<(), Error> {
    let db = connect().await?;
    db.migrate().await.context("Migration failed")?;
    info!("Migrations applied");
    db.close().await;
    Ok(())
}

async fn revoke_user(user_id: Uuid) -> Result<(), Error> {
    let config = AuthConfig::from_env()?;
    let db = connect().await?;
    let service = RefreshTokenService::from_config(Arc::new(db.refresh_token_store()), &config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let count = service.revoke_all(user_id, &cancel).await?;
    logging::log_security_event(
        "refresh_tokens_revoked",
        user_id,
        &format!("Revoked {count} refresh token(s)"),
    );
    println!("{count}");

    db.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_lifetime_picks_largest_whole_unit() {
        assert_eq!(describe_lifetime(Duration::days(7)), "7d");
        assert_eq!(describe_lifetime(Duration::hours(36)), "36h");
        assert_eq!(describe_lifetime(Duration::minutes(15)), "15m");
        assert_eq!(describe_lifetime(Duration::seconds(90)), "90s");
    }
}
