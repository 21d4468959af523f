//! Structured logging for the operator tool.
//!
//! Log output goes to stderr so command output on stdout stays machine-readable.
//! Library logging through the `log` facade is bridged into the same subscriber.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Initialize logging; `RUST_LOG` overrides the default filter
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Log security event with structured data
///
/// # Example
///
/// ```ignore
/// log_security_event("refresh_tokens_revoked", user_id, "Revoked 3 refresh token(s)");
/// ```
pub fn log_security_event(event_type: &str, user_id: Uuid, message: &str) {
    tracing::warn!(
        event_type = event_type,
        user_id = %user_id,
        "SECURITY: {}",
        message
    );
}
