//! Integration tests for token package assembly.

use authgate::config::{AuthConfig, SigningKeyConfig};
use authgate::keys::KeyManager;
use authgate::package::{PackageError, TokenPackageAssembler};
use authgate::refresh::{InMemoryRefreshTokenStore, RefreshError, RotationPolicy};
use authgate::signin::{AuthOutcome, Team, TwoFactorProvider, TwoFactorSettings, UserAccount};
use authgate::token::Role;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn config() -> AuthConfig {
    AuthConfig::new(
        "https://auth.package.test",
        SigningKeyConfig::Symmetric {
            secret: "package-integration-secret-0123456789".to_string(),
            legacy_secrets: Vec::new(),
        },
    )
}

fn assembler(config: &AuthConfig) -> (TokenPackageAssembler, Arc<InMemoryRefreshTokenStore>) {
    let keys = Arc::new(KeyManager::from_config(&config.signing).unwrap());
    let store = Arc::new(InMemoryRefreshTokenStore::new());
    (
        TokenPackageAssembler::from_config(config, keys, store.clone()),
        store,
    )
}

fn user(two_factor: Option<TwoFactorProvider>) -> UserAccount {
    UserAccount {
        id: Uuid::new_v4(),
        email: "ada@example.com".to_string(),
        user_name: "ada".to_string(),
        email_confirmed: true,
        password_hash: String::new(),
        role: Role::Admin,
        two_factor: two_factor.map(|provider| TwoFactorSettings {
            provider,
            totp_secret: None,
        }),
    }
}

fn team() -> Team {
    Team {
        id: Uuid::new_v4(),
        name: "core".to_string(),
    }
}

#[tokio::test]
async fn test_two_factor_package_never_has_refresh_token() {
    for enabled in [true, false] {
        let mut config = config();
        config.refresh_tokens_enabled = enabled;
        let (assembler, store) = assembler(&config);
        let user = user(Some(TwoFactorProvider::Sms));

        let package = assembler
            .assemble_for_two_factor_required(&user, TwoFactorProvider::Sms, Some("***-0042"))
            .unwrap();

        assert!(!package.has_refresh_token());
        assert!(package.is_two_factor_pending());
        assert!(store.is_empty().await);

        let verified = assembler.codec().validate(&package.access_token.token).unwrap();
        assert!(verified.claims.is_two_factor_pending());
        assert_eq!(
            verified.claims.two_factor_pending(),
            Some(TwoFactorProvider::Sms)
        );
        assert!(!verified.claims.two_factor_verified());
        assert_eq!(verified.claims.team_id(), None);
        assert!(verified.expires_at <= Utc::now() + config.two_factor_token_lifetime);

        let response = serde_json::to_value(package.to_response(Utc::now())).unwrap();
        assert!(response.get("refresh_token").is_none());
        assert_eq!(response["two_factor"]["provider"], "sms");
        assert_eq!(response["two_factor"]["extra_info"], "***-0042");
    }
}

#[tokio::test]
async fn test_success_package_carries_refresh_token_when_enabled() {
    let (assembler, store) = assembler(&config());
    let user = user(Some(TwoFactorProvider::Authenticator));
    let team = team();
    let cancel = CancellationToken::new();

    let package = assembler
        .assemble_for_success(&user, Some(&team), Some("laptop"), &cancel)
        .await
        .unwrap();

    let refresh = package.refresh_token.as_ref().expect("refresh token attached");
    assert_eq!(refresh.record.user_id, user.id);
    assert_eq!(refresh.record.device_id.as_deref(), Some("laptop"));
    assert_eq!(store.active_for_user(user.id).await.len(), 1);

    let claims = assembler
        .codec()
        .validate(&package.access_token.token)
        .unwrap()
        .claims;
    assert_eq!(claims.subject(), user.id);
    assert_eq!(claims.team_id(), Some(team.id));
    assert_eq!(claims.role(), Role::Admin);
    assert_eq!(claims.device_id(), Some("laptop"));
    assert!(claims.two_factor_verified());
    assert!(!claims.is_two_factor_pending());

    let response = package.to_response(Utc::now());
    assert_eq!(response.token_type, "Bearer");
    assert!(response.expires_in > 0 && response.expires_in <= 15 * 60);
    assert_eq!(response.refresh_token.as_deref(), Some(refresh.payload()));
    assert!(response.two_factor.is_none());
}

#[tokio::test]
async fn test_success_package_without_refresh_tokens() {
    let mut config = config();
    config.refresh_tokens_enabled = false;
    let (assembler, store) = assembler(&config);
    let cancel = CancellationToken::new();
    let user = user(None);

    let package = assembler
        .assemble_for_success(&user, None, None, &cancel)
        .await
        .unwrap();
    assert!(!package.has_refresh_token());
    assert!(store.is_empty().await);

    let claims = assembler
        .codec()
        .validate(&package.access_token.token)
        .unwrap()
        .claims;
    assert!(!claims.two_factor_verified());

    let result = assembler
        .assemble_for_refresh_exchange("anything", &user, None, None, &cancel)
        .await;
    assert!(matches!(
        result,
        Err(PackageError::Refresh(RefreshError::Disabled))
    ));
}

#[tokio::test]
async fn test_refresh_exchange_rotates_and_reissues_access_token() {
    let (assembler, _store) = assembler(&config());
    let user = user(None);
    let team = team();
    let cancel = CancellationToken::new();

    let first = assembler
        .assemble_for_success(&user, Some(&team), Some("phone"), &cancel)
        .await
        .unwrap();
    let first_refresh = first.refresh_token.unwrap();

    // Device omitted on exchange: the record's device is carried into the claims
    let second = assembler
        .assemble_for_refresh_exchange(first_refresh.payload(), &user, Some(&team), None, &cancel)
        .await
        .unwrap();
    let second_refresh = second.refresh_token.as_ref().unwrap();
    assert_ne!(second_refresh.payload(), first_refresh.payload());
    assert_eq!(second_refresh.record.id, first_refresh.record.id);

    let claims = assembler
        .codec()
        .validate(&second.access_token.token)
        .unwrap()
        .claims;
    assert_eq!(claims.device_id(), Some("phone"));
    assert_eq!(claims.team_id(), Some(team.id));

    let replay = assembler
        .assemble_for_refresh_exchange(first_refresh.payload(), &user, Some(&team), None, &cancel)
        .await;
    let err = replay.unwrap_err();
    assert!(matches!(err, PackageError::Refresh(RefreshError::AlreadyRotated)));
    assert!(err.requires_reauthentication());
}

#[tokio::test]
async fn test_refresh_exchange_under_half_life_returns_same_payload() {
    let mut config = config();
    config.rotation_policy = RotationPolicy::HalfLife;
    let (assembler, _store) = assembler(&config);
    let user = user(None);
    let cancel = CancellationToken::new();

    let first = assembler
        .assemble_for_success(&user, None, None, &cancel)
        .await
        .unwrap();
    let payload = first.refresh_token.unwrap().payload().to_string();

    let second = assembler
        .assemble_for_refresh_exchange(&payload, &user, None, None, &cancel)
        .await
        .unwrap();
    assert_eq!(second.refresh_token.unwrap().payload(), payload);
}

#[tokio::test]
async fn test_refresh_exchange_for_other_user_requires_sign_in() {
    let (assembler, _store) = assembler(&config());
    let owner = user(None);
    let cancel = CancellationToken::new();
    let package = assembler
        .assemble_for_success(&owner, None, None, &cancel)
        .await
        .unwrap();
    let payload = package.refresh_token.unwrap().payload().to_string();

    let err = assembler
        .assemble_for_refresh_exchange(&payload, &user(None), None, None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PackageError::Refresh(RefreshError::OwnerMismatch)));
    assert!(err.requires_reauthentication());
}

#[tokio::test]
async fn test_outcome_dispatch() {
    let (assembler, _store) = assembler(&config());
    let cancel = CancellationToken::new();

    for failure in [
        AuthOutcome::NotFound,
        AuthOutcome::EmailConfirmationRequired {
            email: "ada@example.com".to_string(),
        },
        AuthOutcome::Unauthorized { reason: None },
    ] {
        let package = assembler
            .assemble_for_outcome(&failure, Some("phone"), &cancel)
            .await
            .unwrap();
        assert!(package.is_none());
    }

    let pending = AuthOutcome::TwoFactorRequired {
        user: user(Some(TwoFactorProvider::Email)),
        provider: TwoFactorProvider::Email,
        extra_info: None,
    };
    let package = assembler
        .assemble_for_outcome(&pending, Some("phone"), &cancel)
        .await
        .unwrap()
        .unwrap();
    assert!(package.is_two_factor_pending());
    assert!(!package.has_refresh_token());

    let success = AuthOutcome::Succeeded {
        user: user(None),
        team: Some(team()),
    };
    let package = assembler
        .assemble_for_outcome(&success, Some("phone"), &cancel)
        .await
        .unwrap()
        .unwrap();
    assert!(package.has_refresh_token());
    assert!(!package.is_two_factor_pending());
}

#[tokio::test]
async fn test_access_token_lifetime_follows_config() {
    let mut config = config();
    config.access_token_lifetime = Duration::minutes(2);
    let (assembler, _store) = assembler(&config);
    let cancel = CancellationToken::new();

    let package = assembler
        .assemble_for_success(&user(None), None, None, &cancel)
        .await
        .unwrap();
    let verified = assembler.codec().validate(&package.access_token.token).unwrap();
    assert_eq!(verified.expires_at - verified.issued_at, Duration::minutes(2));
}
