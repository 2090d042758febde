//! Counter storage for fixed windows
//!
//! The limiter never reads-then-writes: every hit is a single atomic upsert,
//! so two requests racing on a fresh key end up as counts 1 and 2 of the same
//! window instead of two independent windows.

use crate::error::RateLimitResult;
use crate::policy::RateLimitPolicy;
use async_trait::async_trait;
use database_layer::DatabasePool;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::debug;

/// Storage key for one (identifier, action) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitKey {
    pub key: String,
    pub identifier: String,
    pub action: String,
}

impl RateLimitKey {
    pub fn new(identifier: &str, action: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        hasher.update([0u8]);
        hasher.update(action.as_bytes());

        Self {
            key: hex::encode(hasher.finalize()),
            identifier: identifier.to_string(),
            action: action.to_string(),
        }
    }
}

/// Snapshot of a stored window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowState {
    pub request_count: i64,
    pub window_start: i64,
    pub expires_at: i64,
}

impl WindowState {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request against `key` and return the resulting window
    ///
    /// Starts a fresh window (count 1) when none exists or the stored one has
    /// expired. Once a window holds `limit + 1` requests it stops counting, so
    /// `request_count > limit` means the request was rejected.
    async fn record_hit(
        &self,
        key: &RateLimitKey,
        policy: &RateLimitPolicy,
        now: i64,
    ) -> RateLimitResult<WindowState>;

    /// Stored window for `key`, expired or not
    async fn window(&self, key: &RateLimitKey) -> RateLimitResult<Option<WindowState>>;

    /// Remove the window for `key`; returns whether one existed
    async fn remove(&self, key: &RateLimitKey) -> RateLimitResult<bool>;

    /// Delete every window with `expires_at <= now`
    async fn purge_expired(&self, now: i64) -> RateLimitResult<u64>;
}

/// `rate_limits` table in the shared SQLite database
#[derive(Clone, Debug)]
pub struct SqliteRateLimitStore {
    db: DatabasePool,
}

impl SqliteRateLimitStore {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &DatabasePool {
        &self.db
    }
}

#[async_trait]
impl RateLimitStore for SqliteRateLimitStore {
    async fn record_hit(
        &self,
        key: &RateLimitKey,
        policy: &RateLimitPolicy,
        now: i64,
    ) -> RateLimitResult<WindowState> {
        let expires_at = now.saturating_add(i64::from(policy.window_secs));

        // `excluded.*` carries this request's `now` and fresh expiry; the SET
        // expressions all read the pre-update row.
        let row = sqlx::query(
            r#"
            INSERT INTO rate_limits (key, identifier, action, request_count, window_start, expires_at)
            VALUES (?, ?, ?, 1, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                request_count = CASE
                    WHEN rate_limits.expires_at <= excluded.window_start THEN 1
                    WHEN rate_limits.request_count > ? THEN rate_limits.request_count
                    ELSE rate_limits.request_count + 1
                END,
                window_start = CASE
                    WHEN rate_limits.expires_at <= excluded.window_start THEN excluded.window_start
                    ELSE rate_limits.window_start
                END,
                expires_at = CASE
                    WHEN rate_limits.expires_at <= excluded.window_start THEN excluded.expires_at
                    ELSE rate_limits.expires_at
                END
            RETURNING request_count, window_start, expires_at
            "#,
        )
        .bind(&key.key)
        .bind(&key.identifier)
        .bind(&key.action)
        .bind(now)
        .bind(expires_at)
        .bind(i64::from(policy.limit))
        .fetch_one(self.db.pool())
        .await?;

        let state = WindowState {
            request_count: row.try_get("request_count")?,
            window_start: row.try_get("window_start")?,
            expires_at: row.try_get("expires_at")?,
        };

        debug!(
            action = %key.action,
            request_count = state.request_count,
            expires_at = state.expires_at,
            "Recorded rate limit hit"
        );

        Ok(state)
    }

    async fn window(&self, key: &RateLimitKey) -> RateLimitResult<Option<WindowState>> {
        let row = sqlx::query(
            r#"
            SELECT request_count, window_start, expires_at
            FROM rate_limits
            WHERE key = ?
            "#,
        )
        .bind(&key.key)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| -> RateLimitResult<WindowState> {
            Ok(WindowState {
                request_count: row.try_get("request_count")?,
                window_start: row.try_get("window_start")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn remove(&self, key: &RateLimitKey) -> RateLimitResult<bool> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE key = ?")
            .bind(&key.key)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: i64) -> RateLimitResult<u64> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE expires_at <= ?")
            .bind(now)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
