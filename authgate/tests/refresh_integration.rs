//! Integration tests for refresh token exchange.
//!
//! Runs against the in-memory store so the rotation and reuse rules can be
//! exercised without a database.

use async_trait::async_trait;
use authgate::db::RefreshTokenStore;
use authgate::refresh::{
    InMemoryRefreshTokenStore, PayloadReplacement, RefreshError, RefreshResult, RefreshToken,
    RefreshTokenService, Rotation, RotationPolicy,
};
use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn setup() -> (Arc<InMemoryRefreshTokenStore>, RefreshTokenService) {
    let store = Arc::new(InMemoryRefreshTokenStore::new());
    let service = RefreshTokenService::new(store.clone(), Duration::days(30));
    (store, service)
}

/// In-memory store whose payload swap applies, then answers late
struct SlowSwapStore {
    inner: InMemoryRefreshTokenStore,
    delay: std::time::Duration,
}

#[async_trait]
impl RefreshTokenStore for SlowSwapStore {
    async fn insert(&self, token: &RefreshToken) -> RefreshResult<()> {
        self.inner.insert(token).await
    }

    async fn insert_replacing_device(&self, token: &RefreshToken) -> RefreshResult<u64> {
        self.inner.insert_replacing_device(token).await
    }

    async fn find_by_hash(&self, payload_hash: &str) -> RefreshResult<Option<RefreshToken>> {
        self.inner.find_by_hash(payload_hash).await
    }

    async fn find_by_previous_hash(
        &self,
        payload_hash: &str,
    ) -> RefreshResult<Option<RefreshToken>> {
        self.inner.find_by_previous_hash(payload_hash).await
    }

    async fn swap_payload(
        &self,
        id: Uuid,
        expected_hash: &str,
        replacement: &PayloadReplacement,
    ) -> RefreshResult<bool> {
        let swapped = self
            .inner
            .swap_payload(id, expected_hash, replacement)
            .await?;
        tokio::time::sleep(self.delay).await;
        Ok(swapped)
    }

    async fn revoke(&self, id: Uuid) -> RefreshResult<bool> {
        self.inner.revoke(id).await
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> RefreshResult<u64> {
        self.inner.revoke_all_for_user(user_id).await
    }
}

#[tokio::test]
async fn test_always_policy_payload_is_single_use() {
    let (_store, service) = setup();
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let issued = service.issue(user, Some("phone"), &cancel).await.unwrap();

    let rotation = service
        .exchange(issued.payload(), user, Some("phone"), RotationPolicy::Always, &cancel)
        .await
        .unwrap();
    let next = rotation.new_payload().expect("payload replaced").to_string();
    assert_ne!(next, issued.payload());

    // Replayed straight away: the caller lost a race, nothing is revoked
    let replay = service
        .exchange(issued.payload(), user, Some("phone"), RotationPolicy::Always, &cancel)
        .await;
    assert!(matches!(replay, Err(RefreshError::AlreadyRotated)));
    assert!(service.find(&next, &cancel).await.unwrap().is_some());

    // The new payload keeps working
    let again = service
        .exchange(&next, user, Some("phone"), RotationPolicy::Always, &cancel)
        .await
        .unwrap();
    assert!(again.is_rotated());
}

#[tokio::test]
async fn test_half_life_returns_same_payload_for_fresh_token() {
    let (_store, service) = setup();
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let issued = service.issue(user, None, &cancel).await.unwrap();

    for _ in 0..3 {
        let rotation = service
            .exchange(issued.payload(), user, None, RotationPolicy::HalfLife, &cancel)
            .await
            .unwrap();
        assert!(!rotation.is_rotated());
        assert_eq!(rotation.record().payload_hash, issued.record.payload_hash);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exchange_has_exactly_one_winner() {
    let (_store, service) = setup();
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let issued = service.issue(user, None, &cancel).await.unwrap();
    let payload = issued.payload().to_string();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let payload = payload.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            service
                .exchange(&payload, user, None, RotationPolicy::Always, &cancel)
                .await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(rotation) => winners.push(rotation),
            Err(RefreshError::AlreadyRotated) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1);
    let Rotation::Rotated(winner) = winners.remove(0) else {
        panic!("expected a rotation");
    };
    assert!(service.find(winner.payload(), &cancel).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reuse_after_interval_revokes_the_chain() {
    let store = Arc::new(InMemoryRefreshTokenStore::new());
    let service = RefreshTokenService::new(store.clone(), Duration::days(30))
        .with_reuse_interval(Duration::zero());
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let issued = service.issue(user, None, &cancel).await.unwrap();

    let rotation = service
        .exchange(issued.payload(), user, None, RotationPolicy::Always, &cancel)
        .await
        .unwrap();
    let next = rotation.new_payload().unwrap().to_string();

    let replay = service
        .exchange(issued.payload(), user, None, RotationPolicy::Always, &cancel)
        .await;
    assert!(matches!(replay, Err(RefreshError::ReuseDetected)));

    // The legitimate holder is logged out too
    let after = service
        .exchange(&next, user, None, RotationPolicy::Always, &cancel)
        .await;
    assert!(matches!(after, Err(RefreshError::Revoked)));
    assert!(store.active_for_user(user).await.is_empty());
}

#[tokio::test]
async fn test_reuse_without_revocation_keeps_new_payload() {
    let store = Arc::new(InMemoryRefreshTokenStore::new());
    let service = RefreshTokenService::new(store, Duration::days(30))
        .with_reuse_interval(Duration::zero())
        .with_revoke_on_reuse(false);
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let issued = service.issue(user, None, &cancel).await.unwrap();

    let rotation = service
        .exchange(issued.payload(), user, None, RotationPolicy::Always, &cancel)
        .await
        .unwrap();
    let next = rotation.new_payload().unwrap().to_string();

    let replay = service
        .exchange(issued.payload(), user, None, RotationPolicy::Always, &cancel)
        .await;
    assert!(matches!(replay, Err(RefreshError::ReuseDetected)));
    assert!(service.find(&next, &cancel).await.unwrap().is_some());
}

#[tokio::test]
async fn test_exchange_rejects_wrong_owner_and_device() {
    let (_store, service) = setup();
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let issued = service.issue(user, Some("phone"), &cancel).await.unwrap();

    let stranger = service
        .exchange(
            issued.payload(),
            Uuid::new_v4(),
            Some("phone"),
            RotationPolicy::Always,
            &cancel,
        )
        .await;
    assert!(matches!(stranger, Err(RefreshError::OwnerMismatch)));

    let other_device = service
        .exchange(issued.payload(), user, Some("tablet"), RotationPolicy::Always, &cancel)
        .await;
    assert!(matches!(other_device, Err(RefreshError::DeviceMismatch)));

    let unknown = service
        .exchange("not-a-payload", user, None, RotationPolicy::Always, &cancel)
        .await;
    assert!(matches!(unknown, Err(RefreshError::NotFound)));

    // Rejections leave the token usable by its owner
    assert!(service.find(issued.payload(), &cancel).await.unwrap().is_some());
}

#[tokio::test]
async fn test_revoke_all_logs_out_every_device() {
    let (store, service) = setup();
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();

    let phone = service.issue(user, Some("phone"), &cancel).await.unwrap();
    service.issue(user, Some("laptop"), &cancel).await.unwrap();
    service.issue(other, Some("phone"), &cancel).await.unwrap();

    assert_eq!(service.revoke_all(user, &cancel).await.unwrap(), 2);
    assert!(store.active_for_user(user).await.is_empty());
    assert_eq!(store.active_for_user(other).await.len(), 1);

    let result = service
        .exchange(phone.payload(), user, Some("phone"), RotationPolicy::Always, &cancel)
        .await;
    assert!(matches!(result, Err(RefreshError::Revoked)));
}

#[tokio::test]
async fn test_cancelled_exchange_reports_cancellation() {
    let (_store, service) = setup();
    let live = CancellationToken::new();
    let user = Uuid::new_v4();
    let issued = service.issue(user, None, &live).await.unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let result = service
        .exchange(issued.payload(), user, None, RotationPolicy::Always, &cancelled)
        .await;
    assert!(matches!(result, Err(RefreshError::Cancelled)));

    // Nothing was rotated
    assert!(service.find(issued.payload(), &live).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sign_ins_leave_one_chain_per_device() {
    let (store, service) = setup();
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();

    for round in 0..50 {
        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                service.issue(user, Some("phone"), &cancel).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let active = store.active_for_user(user).await;
        assert_eq!(active.len(), 1, "round {round}: {} active chains", active.len());
    }
}

#[tokio::test]
async fn test_cancel_during_swap_still_delivers_the_new_payload() {
    let store = Arc::new(SlowSwapStore {
        inner: InMemoryRefreshTokenStore::new(),
        delay: std::time::Duration::from_millis(50),
    });
    let service = RefreshTokenService::new(store, Duration::days(30));
    let live = CancellationToken::new();
    let user = Uuid::new_v4();
    let issued = service.issue(user, Some("phone"), &live).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        trigger.cancel();
    });

    // The swap is under way when the token fires, so it completes
    let rotation = service
        .exchange(issued.payload(), user, Some("phone"), RotationPolicy::Always, &cancel)
        .await
        .unwrap();
    assert!(cancel.is_cancelled());
    let next = rotation.new_payload().expect("payload replaced").to_string();

    let again = service
        .exchange(&next, user, Some("phone"), RotationPolicy::Always, &live)
        .await
        .unwrap();
    assert!(again.is_rotated());
}
