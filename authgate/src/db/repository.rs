//! Repository trait definitions for testability and dependency injection.
//!
//! Refresh token storage sits behind [`RefreshTokenStore`] so the service can run
//! against Postgres in production and an in-memory map in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::refresh::{PayloadReplacement, RefreshResult, RefreshToken};

/// Trait for refresh token repository operations
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Store a new record
    async fn insert(&self, token: &RefreshToken) -> RefreshResult<()>;

    /// Find a record by its current payload hash
    async fn find_by_hash(&self, payload_hash: &str) -> RefreshResult<Option<RefreshToken>>;

    /// Find the record whose last rotation replaced `payload_hash`
    async fn find_by_previous_hash(&self, payload_hash: &str)
    -> RefreshResult<Option<RefreshToken>>;

    /// Replace the payload of record `id` if its hash is still `expected_hash`
    /// and it is not revoked. The replaced hash becomes the previous hash.
    ///
    /// Returns false when another writer got there first.
    async fn swap_payload(
        &self,
        id: Uuid,
        expected_hash: &str,
        replacement: &PayloadReplacement,
    ) -> RefreshResult<bool>;

    /// Revoke one record. Returns false if it was missing or already revoked.
    async fn revoke(&self, id: Uuid) -> RefreshResult<bool>;

    /// Store a new record, revoking the user's other active records on the same
    /// device in the same atomic step. Returns how many records were revoked.
    ///
    /// Concurrent calls for one `(user, device)` leave exactly one active record.
    async fn insert_replacing_device(&self, token: &RefreshToken) -> RefreshResult<u64>;

    /// Revoke every non-revoked record of the user
    async fn revoke_all_for_user(&self, user_id: Uuid) -> RefreshResult<u64>;
}

/// PostgreSQL implementation of `RefreshTokenStore`
///
/// Uses the `refresh_tokens` table from `migrations/`. Rotation is a single
/// conditional `UPDATE`; the unique index on `payload_hash` backs lookups.
/// Device replacement runs in one transaction holding a per-device advisory lock.
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn token_from_row(r: &PgRow) -> RefreshToken {
    RefreshToken {
        id: r.get("id"),
        payload_hash: r.get("payload_hash"),
        previous_payload_hash: r.get("previous_payload_hash"),
        user_id: r.get("user_id"),
        device_id: r.get("device_id"),
        issued_at: r.get::<DateTime<Utc>, _>("issued_at"),
        expires_at: r.get::<DateTime<Utc>, _>("expires_at"),
        revoked: r.get("revoked"),
    }
}

async fn insert_token<'e, E>(executor: E, token: &RefreshToken) -> RefreshResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO refresh_tokens
            (id, payload_hash, previous_payload_hash, user_id, device_id,
             issued_at, expires_at, revoked)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(token.id)
    .bind(&token.payload_hash)
    .bind(&token.previous_payload_hash)
    .bind(token.user_id)
    .bind(&token.device_id)
    .bind(token.issued_at)
    .bind(token.expires_at)
    .bind(token.revoked)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, token: &RefreshToken) -> RefreshResult<()> {
        insert_token(&self.pool, token).await
    }

    async fn find_by_hash(&self, payload_hash: &str) -> RefreshResult<Option<RefreshToken>> {
        let row = sqlx::query(
            "SELECT id, payload_hash, previous_payload_hash, user_id, device_id,
                    issued_at, expires_at, revoked
             FROM refresh_tokens WHERE payload_hash = $1",
        )
        .bind(payload_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(token_from_row))
    }

    async fn find_by_previous_hash(
        &self,
        payload_hash: &str,
    ) -> RefreshResult<Option<RefreshToken>> {
        let row = sqlx::query(
            "SELECT id, payload_hash, previous_payload_hash, user_id, device_id,
                    issued_at, expires_at, revoked
             FROM refresh_tokens WHERE previous_payload_hash = $1",
        )
        .bind(payload_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(token_from_row))
    }

    async fn swap_payload(
        &self,
        id: Uuid,
        expected_hash: &str,
        replacement: &PayloadReplacement,
    ) -> RefreshResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens
             SET previous_payload_hash = payload_hash,
                 payload_hash = $3,
                 issued_at = $4,
                 expires_at = $5
             WHERE id = $1 AND payload_hash = $2 AND NOT revoked",
        )
        .bind(id)
        .bind(expected_hash)
        .bind(&replacement.payload_hash)
        .bind(replacement.issued_at)
        .bind(replacement.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, id: Uuid) -> RefreshResult<bool> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1 AND NOT revoked")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_replacing_device(&self, token: &RefreshToken) -> RefreshResult<u64> {
        let mut tx = self.pool.begin().await?;

        let mut replaced = 0;
        if let Some(device_id) = &token.device_id {
            // Serialize issues for this (user, device) until commit; the partial
            // unique index rejects anything that slips past
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(format!("{}:{}", token.user_id, device_id))
                .execute(&mut *tx)
                .await?;

            replaced = sqlx::query(
                "UPDATE refresh_tokens SET revoked = TRUE
                 WHERE user_id = $1 AND device_id = $2 AND NOT revoked",
            )
            .bind(token.user_id)
            .bind(device_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        insert_token(&mut *tx, token).await?;
        tx.commit().await?;

        Ok(replaced)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> RefreshResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND NOT revoked",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
