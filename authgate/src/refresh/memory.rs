//! In-process refresh token store.

use super::{
    errors::RefreshResult,
    models::{PayloadReplacement, RefreshToken},
};
use crate::db::RefreshTokenStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Records {
    by_id: HashMap<Uuid, RefreshToken>,
    /// Current payload hash -> record id
    by_hash: HashMap<String, Uuid>,
}

/// [`RefreshTokenStore`] backed by a `HashMap`.
///
/// Compare-and-swap and device replacement run under the write lock, so they give
/// the same guarantees as the Postgres store's conditional `UPDATE` and transaction.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    records: RwLock<Records>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, revoked ones included
    pub async fn len(&self) -> usize {
        self.records.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Records of the user that are neither revoked nor expired
    pub async fn active_for_user(&self, user_id: Uuid) -> Vec<RefreshToken> {
        let now = chrono::Utc::now();
        self.records
            .read()
            .await
            .by_id
            .values()
            .filter(|t| t.user_id == user_id && t.is_active_at(now))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, token: &RefreshToken) -> RefreshResult<()> {
        let mut records = self.records.write().await;
        records.by_hash.insert(token.payload_hash.clone(), token.id);
        records.by_id.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, payload_hash: &str) -> RefreshResult<Option<RefreshToken>> {
        let records = self.records.read().await;
        Ok(records
            .by_hash
            .get(payload_hash)
            .and_then(|id| records.by_id.get(id))
            .cloned())
    }

    async fn find_by_previous_hash(
        &self,
        payload_hash: &str,
    ) -> RefreshResult<Option<RefreshToken>> {
        let records = self.records.read().await;
        Ok(records
            .by_id
            .values()
            .find(|t| t.previous_payload_hash.as_deref() == Some(payload_hash))
            .cloned())
    }

    async fn swap_payload(
        &self,
        id: Uuid,
        expected_hash: &str,
        replacement: &PayloadReplacement,
    ) -> RefreshResult<bool> {
        let mut records = self.records.write().await;
        let Some(token) = records.by_id.get_mut(&id) else {
            return Ok(false);
        };
        if token.revoked || token.payload_hash != expected_hash {
            return Ok(false);
        }

        let replaced =
            std::mem::replace(&mut token.payload_hash, replacement.payload_hash.clone());
        token.previous_payload_hash = Some(replaced.clone());
        token.issued_at = replacement.issued_at;
        token.expires_at = replacement.expires_at;

        records.by_hash.remove(&replaced);
        records.by_hash.insert(replacement.payload_hash.clone(), id);
        Ok(true)
    }

    async fn revoke(&self, id: Uuid) -> RefreshResult<bool> {
        let mut records = self.records.write().await;
        match records.by_id.get_mut(&id) {
            Some(token) if !token.revoked => {
                token.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_replacing_device(&self, token: &RefreshToken) -> RefreshResult<u64> {
        let mut records = self.records.write().await;
        let mut replaced = 0;
        if let Some(device_id) = token.device_id.as_deref() {
            for existing in records.by_id.values_mut() {
                if existing.user_id == token.user_id
                    && existing.device_id.as_deref() == Some(device_id)
                    && !existing.revoked
                {
                    existing.revoked = true;
                    replaced += 1;
                }
            }
        }
        records.by_hash.insert(token.payload_hash.clone(), token.id);
        records.by_id.insert(token.id, token.clone());
        Ok(replaced)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> RefreshResult<u64> {
        let mut records = self.records.write().await;
        let mut count = 0;
        for token in records.by_id.values_mut() {
            if token.user_id == user_id && !token.revoked {
                token.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }
}
