//! Refresh token issuance, rotation and revocation.

use super::{
    errors::{RefreshError, RefreshResult},
    exchange::{ValidatedExchange, validate_exchange},
    models::{
        IssuedRefreshToken, NEVER_EXPIRE_HORIZON_DAYS, PayloadReplacement, RefreshToken,
        Rotation, RotationPolicy, generate_payload, hash_payload,
    },
};
use crate::{
    cancel::{ensure_not_cancelled, until_cancelled},
    config::AuthConfig,
    db::RefreshTokenStore,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Issues and rotates opaque refresh tokens.
///
/// Reads are raced against the caller's cancellation token. Writes check it
/// first and then run to completion.
#[derive(Clone)]
pub struct RefreshTokenService {
    store: Arc<dyn RefreshTokenStore>,
    lifetime: Duration,
    policy: RotationPolicy,
    revoke_on_reuse: bool,
    reuse_interval: Duration,
}

impl RefreshTokenService {
    /// Create a service with the `Always` policy, reuse revocation on and a
    /// ten second reuse interval
    pub fn new(store: Arc<dyn RefreshTokenStore>, lifetime: Duration) -> Self {
        Self {
            store,
            lifetime,
            policy: RotationPolicy::Always,
            revoke_on_reuse: true,
            reuse_interval: Duration::seconds(10),
        }
    }

    pub fn from_config(store: Arc<dyn RefreshTokenStore>, config: &AuthConfig) -> Self {
        Self::new(store, config.refresh_token_lifetime)
            .with_policy(config.rotation_policy)
            .with_revoke_on_reuse(config.revoke_on_reuse)
            .with_reuse_interval(config.reuse_interval)
    }

    pub fn with_policy(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_revoke_on_reuse(mut self, revoke: bool) -> Self {
        self.revoke_on_reuse = revoke;
        self
    }

    pub fn with_reuse_interval(mut self, interval: Duration) -> Self {
        self.reuse_interval = interval;
        self
    }

    /// Configured rotation policy
    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.policy {
            RotationPolicy::NeverExpire => now + Duration::days(NEVER_EXPIRE_HORIZON_DAYS),
            _ => now + self.lifetime,
        }
    }

    /// Issue a new refresh token.
    ///
    /// When a device is given, the user's earlier active tokens for that device
    /// are revoked in the same store operation that inserts the new one.
    ///
    /// Cancellation is honoured up to the write. Once the write starts it runs to
    /// completion and its result is returned.
    ///
    /// # Errors
    ///
    /// * `RefreshError::Storage` - store failure
    /// * `RefreshError::Cancelled` - `cancel` fired before the write
    pub async fn issue(
        &self,
        user_id: Uuid,
        device_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> RefreshResult<IssuedRefreshToken> {
        let payload = generate_payload();
        let now = Utc::now();
        let record = RefreshToken {
            id: Uuid::new_v4(),
            payload_hash: hash_payload(&payload),
            previous_payload_hash: None,
            user_id,
            device_id: device_id.map(str::to_string),
            issued_at: now,
            expires_at: self.expiry_from(now),
            revoked: false,
        };

        ensure_not_cancelled(cancel)?;
        let replaced = self.store.insert_replacing_device(&record).await?;
        if replaced > 0 {
            log::debug!(
                "Revoked {} earlier refresh token(s) of user {} on device {}",
                replaced,
                user_id,
                device_id.unwrap_or_default()
            );
        }
        log::info!("Issued refresh token {} for user {}", record.id, user_id);

        Ok(IssuedRefreshToken::new(payload, record))
    }

    /// Find the active record for a raw payload.
    ///
    /// Unknown, expired and revoked payloads all yield `None`.
    ///
    /// # Errors
    ///
    /// * `RefreshError::Storage` - store failure
    /// * `RefreshError::Cancelled` - `cancel` fired
    pub async fn find(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> RefreshResult<Option<RefreshToken>> {
        let now = Utc::now();
        Ok(self
            .lookup(raw, cancel)
            .await?
            .filter(|record| record.is_active_at(now)))
    }

    /// Find the record for a raw payload whatever its state
    ///
    /// # Errors
    ///
    /// * `RefreshError::Storage` - store failure
    /// * `RefreshError::Cancelled` - `cancel` fired
    pub async fn lookup(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> RefreshResult<Option<RefreshToken>> {
        let hash = hash_payload(raw);
        Ok(until_cancelled(cancel, self.store.find_by_hash(&hash)).await??)
    }

    /// Find the record for a raw payload, detecting replays of replaced payloads.
    ///
    /// # Errors
    ///
    /// * `RefreshError::NotFound` - no record current or previous for this payload
    /// * `RefreshError::AlreadyRotated` - payload was replaced within the reuse interval
    /// * `RefreshError::ReuseDetected` - payload was replaced earlier; the record is
    ///   revoked when reuse revocation is on
    /// * `RefreshError::Storage` / `RefreshError::Cancelled`
    pub async fn locate(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> RefreshResult<RefreshToken> {
        let hash = hash_payload(raw);
        if let Some(record) = until_cancelled(cancel, self.store.find_by_hash(&hash)).await?? {
            return Ok(record);
        }

        let Some(record) =
            until_cancelled(cancel, self.store.find_by_previous_hash(&hash)).await??
        else {
            return Err(RefreshError::NotFound);
        };

        if Utc::now() - record.issued_at < self.reuse_interval {
            log::debug!(
                "Replaced payload of refresh token {} presented inside the reuse interval",
                record.id
            );
            return Err(RefreshError::AlreadyRotated);
        }

        log::warn!(
            "Replaced payload of refresh token {} (user {}) presented again",
            record.id,
            record.user_id
        );
        if self.revoke_on_reuse && !record.revoked {
            until_cancelled(cancel, self.store.revoke(record.id)).await??;
            log::warn!("Revoked refresh token {} after reuse", record.id);
        }
        Err(RefreshError::ReuseDetected)
    }

    /// Apply `policy` to `existing`.
    ///
    /// `HalfLife` keeps the payload while strictly more than half of the record's
    /// own `issued_at..expires_at` span remains; at exactly half it rotates.
    ///
    /// # Errors
    ///
    /// * `RefreshError::AlreadyRotated` - a concurrent rotation replaced the payload first
    /// * `RefreshError::Storage`
    /// * `RefreshError::Cancelled` - `cancel` fired before the swap; a swap in
    ///   progress always completes
    pub async fn rotate(
        &self,
        existing: &RefreshToken,
        policy: RotationPolicy,
        cancel: &CancellationToken,
    ) -> RefreshResult<Rotation> {
        let now = Utc::now();
        match policy {
            RotationPolicy::Always => self.replace_payload(existing, now, cancel).await,
            RotationPolicy::HalfLife => {
                if existing.remaining_at(now) * 2 > existing.lifetime() {
                    Ok(Rotation::Unchanged(existing.clone()))
                } else {
                    self.replace_payload(existing, now, cancel).await
                }
            }
            // Same payload stays valid until revoked (or expired, for Disabled)
            RotationPolicy::NeverExpire | RotationPolicy::Disabled => {
                Ok(Rotation::Unchanged(existing.clone()))
            }
        }
    }

    /// Rotate a record that passed [`validate_exchange`]
    ///
    /// # Errors
    ///
    /// Same as [`RefreshTokenService::rotate`].
    pub async fn rotate_validated(
        &self,
        validated: ValidatedExchange,
        policy: RotationPolicy,
        cancel: &CancellationToken,
    ) -> RefreshResult<Rotation> {
        self.rotate(&validated.into_record(), policy, cancel).await
    }

    /// Locate, validate and rotate in one step
    ///
    /// # Errors
    ///
    /// Any [`RefreshError`] from [`RefreshTokenService::locate`], the exchange
    /// check, or [`RefreshTokenService::rotate`].
    pub async fn exchange(
        &self,
        raw: &str,
        user_id: Uuid,
        device_id: Option<&str>,
        policy: RotationPolicy,
        cancel: &CancellationToken,
    ) -> RefreshResult<Rotation> {
        let record = self.locate(raw, cancel).await?;
        let presented_hash = hash_payload(raw);
        let validated =
            validate_exchange(&record, &presented_hash, user_id, device_id, Utc::now())
                .into_result()
                .map_err(|rejection| {
                    log::debug!("Refresh token {} rejected: {:?}", record.id, rejection);
                    RefreshError::from(rejection)
                })?;
        self.rotate_validated(validated, policy, cancel).await
    }

    /// Revoke the token behind a raw payload. Returns false if nothing was revoked.
    ///
    /// # Errors
    ///
    /// * `RefreshError::Storage` / `RefreshError::Cancelled`
    pub async fn revoke(&self, raw: &str, cancel: &CancellationToken) -> RefreshResult<bool> {
        let Some(record) = self.lookup(raw, cancel).await? else {
            return Ok(false);
        };
        let revoked = until_cancelled(cancel, self.store.revoke(record.id)).await??;
        if revoked {
            log::info!("Revoked refresh token {}", record.id);
        }
        Ok(revoked)
    }

    /// Revoke every active token of a user (logout everywhere, password change)
    ///
    /// # Errors
    ///
    /// * `RefreshError::Storage` / `RefreshError::Cancelled`
    pub async fn revoke_all(
        &self,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> RefreshResult<u64> {
        let count = until_cancelled(cancel, self.store.revoke_all_for_user(user_id)).await??;
        log::info!("Revoked {} refresh token(s) for user {}", count, user_id);
        Ok(count)
    }

    async fn replace_payload(
        &self,
        existing: &RefreshToken,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> RefreshResult<Rotation> {
        let payload = generate_payload();
        let replacement = PayloadReplacement {
            payload_hash: hash_payload(&payload),
            issued_at: now,
            expires_at: now + self.lifetime,
        };

        // A swap that committed must reach the caller, or the new payload is lost
        // while the presented one already counts as replaced
        ensure_not_cancelled(cancel)?;
        let swapped = self
            .store
            .swap_payload(existing.id, &existing.payload_hash, &replacement)
            .await?;
        if !swapped {
            log::warn!("Lost rotation race for refresh token {}", existing.id);
            return Err(RefreshError::AlreadyRotated);
        }

        let record = RefreshToken {
            payload_hash: replacement.payload_hash,
            previous_payload_hash: Some(existing.payload_hash.clone()),
            issued_at: replacement.issued_at,
            expires_at: replacement.expires_at,
            ..existing.clone()
        };
        Ok(Rotation::Rotated(IssuedRefreshToken::new(payload, record)))
    }
}

impl std::fmt::Debug for RefreshTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenService")
            .field("lifetime", &self.lifetime)
            .field("policy", &self.policy)
            .field("revoke_on_reuse", &self.revoke_on_reuse)
            .field("reuse_interval", &self.reuse_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::InMemoryRefreshTokenStore;

    fn service(store: Arc<InMemoryRefreshTokenStore>) -> RefreshTokenService {
        RefreshTokenService::new(store, Duration::days(10))
    }

    fn aged(record: &RefreshToken, elapsed: Duration) -> RefreshToken {
        RefreshToken {
            issued_at: record.issued_at - elapsed,
            expires_at: record.expires_at - elapsed,
            ..record.clone()
        }
    }

    #[tokio::test]
    async fn test_issue_stores_only_hash() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = service(store.clone());
        let cancel = CancellationToken::new();

        let issued = service.issue(Uuid::new_v4(), None, &cancel).await.unwrap();
        let stored = store
            .find_by_hash(&issued.record.payload_hash)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.payload_hash, issued.payload());
        assert_eq!(stored.payload_hash, hash_payload(issued.payload()));
        assert_eq!(stored.lifetime(), Duration::days(10));
    }

    #[tokio::test]
    async fn test_find_hides_revoked_tokens_but_lookup_does_not() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = service(store.clone());
        let cancel = CancellationToken::new();
        let issued = service.issue(Uuid::new_v4(), None, &cancel).await.unwrap();

        assert!(service.find(issued.payload(), &cancel).await.unwrap().is_some());
        assert!(service.revoke(issued.payload(), &cancel).await.unwrap());
        assert!(service.find(issued.payload(), &cancel).await.unwrap().is_none());

        let record = service.lookup(issued.payload(), &cancel).await.unwrap().unwrap();
        assert!(record.revoked);
        assert!(service.find("never-issued", &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_always_policy_replaces_payload_same_id() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = service(store.clone());
        let cancel = CancellationToken::new();
        let issued = service.issue(Uuid::new_v4(), None, &cancel).await.unwrap();

        let rotation = service
            .rotate(&issued.record, RotationPolicy::Always, &cancel)
            .await
            .unwrap();
        let Rotation::Rotated(next) = rotation else {
            panic!("expected rotation");
        };
        assert_eq!(next.record.id, issued.record.id);
        assert_ne!(next.payload(), issued.payload());
        assert!(service.find(issued.payload(), &cancel).await.unwrap().is_none());
        assert!(service.find(next.payload(), &cancel).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_half_life_keeps_payload_while_more_than_half_remains() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = service(store);
        let cancel = CancellationToken::new();
        let issued = service.issue(Uuid::new_v4(), None, &cancel).await.unwrap();

        let young = aged(&issued.record, Duration::days(4));
        let rotation = service
            .rotate(&young, RotationPolicy::HalfLife, &cancel)
            .await
            .unwrap();
        assert_eq!(rotation, Rotation::Unchanged(young));
    }

    #[tokio::test]
    async fn test_half_life_rotates_at_exactly_half() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = service(store.clone());
        let cancel = CancellationToken::new();
        let issued = service.issue(Uuid::new_v4(), None, &cancel).await.unwrap();

        // Five of ten days gone, plus the time the test itself takes
        let halfway = aged(&issued.record, Duration::days(5));
        store.insert(&halfway).await.unwrap();
        let rotation = service
            .rotate(&halfway, RotationPolicy::HalfLife, &cancel)
            .await
            .unwrap();
        assert!(rotation.is_rotated());
    }

    #[tokio::test]
    async fn test_never_expire_and_disabled_do_not_rotate() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = service(store).with_policy(RotationPolicy::NeverExpire);
        let cancel = CancellationToken::new();
        let issued = service.issue(Uuid::new_v4(), None, &cancel).await.unwrap();
        assert!(issued.record.lifetime() >= Duration::days(NEVER_EXPIRE_HORIZON_DAYS));

        for policy in [RotationPolicy::NeverExpire, RotationPolicy::Disabled] {
            let rotation = service.rotate(&issued.record, policy, &cancel).await.unwrap();
            assert_eq!(rotation.new_payload(), None);
            assert_eq!(rotation.record(), &issued.record);
        }
    }

    #[tokio::test]
    async fn test_one_active_chain_per_device() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = service(store.clone());
        let cancel = CancellationToken::new();
        let user = Uuid::new_v4();

        let first = service.issue(user, Some("phone"), &cancel).await.unwrap();
        let second = service.issue(user, Some("phone"), &cancel).await.unwrap();
        let laptop = service.issue(user, Some("laptop"), &cancel).await.unwrap();

        assert!(service.find(first.payload(), &cancel).await.unwrap().is_none());
        assert!(service.find(second.payload(), &cancel).await.unwrap().is_some());
        assert!(service.find(laptop.payload(), &cancel).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancelled_issue_does_not_store() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = service(store.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = service.issue(Uuid::new_v4(), None, &cancel).await;
        assert!(matches!(result, Err(RefreshError::Cancelled)));
        assert!(store.is_empty().await);
    }
}
