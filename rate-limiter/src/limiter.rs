//! Fixed-window rate limiter
//!
//! Per (identifier, action) key the window moves through
//! `NoRecord -> Active(count < limit) -> Active(count >= limit, rejecting)
//! -> Expired -> NoRecord (sweep) | NewWindow (next hit)`.

use crate::error::{RateLimitError, RateLimitResult};
use crate::policy::{RateLimitPolicy, RateLimiterConfig, UnknownActionPolicy};
use crate::store::{RateLimitKey, RateLimitStore, SqliteRateLimitStore, WindowState};
use chrono::{DateTime, Utc};
use database_layer::{spawn_periodic, Clock, DatabasePool, PeriodicTask, SystemClock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window; `u32::MAX` for unlimited actions
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
    /// Configured limit, `None` when the action has no policy
    pub limit: Option<u32>,
}

impl RateLimitDecision {
    fn unlimited(now: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining: u32::MAX,
            reset_at: now,
            limit: None,
        }
    }

    fn denied_unknown(now: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at: now,
            limit: None,
        }
    }

    /// Whole seconds until the window resets, zero once it has
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        let secs = (self.reset_at - now).num_seconds().max(0);
        Duration::from_secs(u64::try_from(secs).unwrap_or(0))
    }
}

/// Fixed-window rate limiter over a shared counter store
///
/// Cheap to clone; clones share configuration, store and clock.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimiterConfig>,
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter with an explicit store and clock
    pub fn new(
        config: RateLimiterConfig,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> RateLimitResult<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            store,
            clock,
        })
    }

    /// Limiter backed by the `rate_limits` table and the system clock
    pub fn with_database(config: RateLimiterConfig, db: DatabasePool) -> RateLimitResult<Self> {
        Self::new(
            config,
            Arc::new(SqliteRateLimitStore::new(db)),
            Arc::new(SystemClock),
        )
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn now(&self) -> (DateTime<Utc>, i64) {
        let now = self.clock.now();
        (now, now.timestamp())
    }

    fn to_datetime(timestamp: i64) -> RateLimitResult<DateTime<Utc>> {
        DateTime::from_timestamp(timestamp, 0).ok_or(RateLimitError::InvalidTimestamp(timestamp))
    }

    /// Policy for `action`, or the decision to return when it has none
    fn resolve_policy(
        &self,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitPolicy, RateLimitDecision> {
        if !self.config.enabled {
            return Err(RateLimitDecision::unlimited(now));
        }

        match self.config.policy(action) {
            Some(policy) => Ok(*policy),
            None => match self.config.unknown_action {
                UnknownActionPolicy::Allow => {
                    debug!(action, "No rate limit policy for action, allowing");
                    Err(RateLimitDecision::unlimited(now))
                }
                UnknownActionPolicy::Deny => {
                    warn!(action, "No rate limit policy for action, denying");
                    Err(RateLimitDecision::denied_unknown(now))
                }
            },
        }
    }

    /// Spend one request for `identifier` on `action`
    ///
    /// Storage failures are returned to the caller, who decides whether to
    /// fail open or closed.
    pub async fn check_limit(
        &self,
        action: &str,
        identifier: &str,
    ) -> RateLimitResult<RateLimitDecision> {
        let (now, now_ts) = self.now();
        let policy = match self.resolve_policy(action, now) {
            Ok(policy) => policy,
            Err(decision) => return Ok(decision),
        };

        let key = RateLimitKey::new(identifier, action);
        let state = self.store.record_hit(&key, &policy, now_ts).await?;

        let allowed = state.request_count <= i64::from(policy.limit);
        let decision = RateLimitDecision {
            allowed,
            remaining: policy.remaining_after(state.request_count),
            reset_at: Self::to_datetime(state.expires_at)?,
            limit: Some(policy.limit),
        };

        if !allowed {
            warn!(
                action,
                identifier,
                limit = policy.limit,
                reset_at = %decision.reset_at,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Current window for `identifier` on `action` without spending a request
    ///
    /// Reports what the next `check_limit` would see before counting: full
    /// quota when there is no live window.
    pub async fn status(
        &self,
        action: &str,
        identifier: &str,
    ) -> RateLimitResult<RateLimitDecision> {
        let (now, now_ts) = self.now();
        let policy = match self.resolve_policy(action, now) {
            Ok(policy) => policy,
            Err(decision) => return Ok(decision),
        };

        let key = RateLimitKey::new(identifier, action);
        let live = self
            .store
            .window(&key)
            .await?
            .filter(|state| !state.is_expired(now_ts));

        let decision = match live {
            Some(WindowState {
                request_count,
                expires_at,
                ..
            }) => RateLimitDecision {
                allowed: request_count < i64::from(policy.limit),
                remaining: policy.remaining_after(request_count),
                reset_at: Self::to_datetime(expires_at)?,
                limit: Some(policy.limit),
            },
            None => RateLimitDecision {
                allowed: true,
                remaining: policy.limit,
                reset_at: Self::to_datetime(now_ts.saturating_add(i64::from(policy.window_secs)))?,
                limit: Some(policy.limit),
            },
        };

        Ok(decision)
    }

    /// Forget the window for `identifier` on `action`
    pub async fn reset(&self, action: &str, identifier: &str) -> RateLimitResult<bool> {
        let key = RateLimitKey::new(identifier, action);
        let removed = self.store.remove(&key).await?;

        info!(action, identifier, removed, "Rate limit reset");
        Ok(removed)
    }

    /// Delete every expired window across all keys
    pub async fn purge_expired(&self) -> RateLimitResult<u64> {
        let (_, now_ts) = self.now();
        let purged = self.store.purge_expired(now_ts).await?;

        if purged > 0 {
            info!(purged, "Purged expired rate limit windows");
        }
        Ok(purged)
    }

    /// Purge expired windows every `interval` on a background task
    pub fn spawn_sweeper(&self, interval: Duration) -> PeriodicTask {
        let limiter = self.clone();
        spawn_periodic("rate_limit_sweeper", interval, move || {
            let limiter = limiter.clone();
            async move { limiter.purge_expired().await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database_layer::ManualClock;

    const START: i64 = 1_700_000_000;

    async fn create_test_limiter(config: RateLimiterConfig) -> (RateLimiter, Arc<ManualClock>) {
        let db = DatabasePool::in_memory().await.unwrap();
        db.initialize_schema().await.unwrap();

        let clock = Arc::new(ManualClock::at_timestamp(START));
        let limiter = RateLimiter::new(
            config,
            Arc::new(SqliteRateLimitStore::new(db)),
            clock.clone(),
        )
        .unwrap();

        (limiter, clock)
    }

    #[tokio::test]
    async fn test_remaining_counts_down_then_rejects() {
        let config = RateLimiterConfig::empty().with_policy("paste_create", 10, 900);
        let (limiter, _clock) = create_test_limiter(config).await;

        for expected in (0..10).rev() {
            let decision = limiter.check_limit("paste_create", "alice").await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
            assert_eq!(decision.reset_at.timestamp(), START + 900);
        }

        let rejected = limiter.check_limit("paste_create", "alice").await.unwrap();
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_at.timestamp(), START + 900);
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let config = RateLimiterConfig::empty().with_policy("login", 2, 60);
        let (limiter, clock) = create_test_limiter(config).await;

        limiter.check_limit("login", "alice").await.unwrap();
        limiter.check_limit("login", "alice").await.unwrap();
        assert!(!limiter.check_limit("login", "alice").await.unwrap().allowed);

        clock.advance_secs(61);

        let decision = limiter.check_limit("login", "alice").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.reset_at.timestamp(), START + 61 + 60);
    }

    #[tokio::test]
    async fn test_identifiers_and_actions_are_independent() {
        let config = RateLimiterConfig::empty()
            .with_policy("login", 1, 60)
            .with_policy("register", 1, 60);
        let (limiter, _clock) = create_test_limiter(config).await;

        assert!(limiter.check_limit("login", "alice").await.unwrap().allowed);
        assert!(!limiter.check_limit("login", "alice").await.unwrap().allowed);

        assert!(limiter.check_limit("login", "bob").await.unwrap().allowed);
        assert!(limiter.check_limit("register", "alice").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_unknown_action_allowed_by_default() {
        let (limiter, _clock) = create_test_limiter(RateLimiterConfig::empty()).await;

        let decision = limiter.check_limit("achievement_unlock", "alice").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, u32::MAX);
        assert_eq!(decision.limit, None);
    }

    #[tokio::test]
    async fn test_unknown_action_denied_when_configured() {
        let config = RateLimiterConfig::empty().with_unknown_action(UnknownActionPolicy::Deny);
        let (limiter, _clock) = create_test_limiter(config).await;

        let decision = limiter.check_limit("achievement_unlock", "alice").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn test_disabled_limiter_allows_everything() {
        let config = RateLimiterConfig::empty()
            .with_policy("login", 1, 60)
            .with_enabled(false);
        let (limiter, _clock) = create_test_limiter(config).await;

        for _ in 0..5 {
            assert!(limiter.check_limit("login", "alice").await.unwrap().allowed);
        }
    }

    #[tokio::test]
    async fn test_status_does_not_consume() {
        let config = RateLimiterConfig::empty().with_policy("comment_create", 3, 600);
        let (limiter, _clock) = create_test_limiter(config).await;

        let fresh = limiter.status("comment_create", "alice").await.unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 3);

        limiter.check_limit("comment_create", "alice").await.unwrap();

        for _ in 0..3 {
            let status = limiter.status("comment_create", "alice").await.unwrap();
            assert_eq!(status.remaining, 2);
            assert_eq!(status.reset_at.timestamp(), START + 600);
        }
    }

    #[tokio::test]
    async fn test_status_reports_exhausted_window() {
        let config = RateLimiterConfig::empty().with_policy("paste_flag", 1, 3600);
        let (limiter, clock) = create_test_limiter(config).await;

        limiter.check_limit("paste_flag", "alice").await.unwrap();
        let status = limiter.status("paste_flag", "alice").await.unwrap();
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);

        clock.advance_secs(3600);
        let status = limiter.status("paste_flag", "alice").await.unwrap();
        assert!(status.allowed);
        assert_eq!(status.remaining, 1);
    }

    #[tokio::test]
    async fn test_reset_restores_quota() {
        let config = RateLimiterConfig::empty().with_policy("login", 1, 900);
        let (limiter, _clock) = create_test_limiter(config).await;

        limiter.check_limit("login", "alice").await.unwrap();
        assert!(!limiter.check_limit("login", "alice").await.unwrap().allowed);

        assert!(limiter.reset("login", "alice").await.unwrap());
        assert!(limiter.check_limit("login", "alice").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_purge_expired_uses_clock() {
        let config = RateLimiterConfig::empty().with_policy("login", 5, 60);
        let (limiter, clock) = create_test_limiter(config).await;

        limiter.check_limit("login", "alice").await.unwrap();
        assert_eq!(limiter.purge_expired().await.unwrap(), 0);

        clock.advance_secs(60);
        assert_eq!(limiter.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_after() {
        let config = RateLimiterConfig::empty().with_policy("login", 1, 900);
        let (limiter, clock) = create_test_limiter(config).await;

        let decision = limiter.check_limit("login", "alice").await.unwrap();
        assert_eq!(decision.retry_after(clock.now()), Duration::from_secs(900));

        clock.advance_secs(1000);
        assert_eq!(decision.retry_after(clock.now()), Duration::ZERO);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RateLimiterConfig::empty().with_policy("login", 0, 60);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_timestamp(START));

        // Store is never touched during validation
        let store: Arc<dyn RateLimitStore> = Arc::new(FailingStore);
        assert!(RateLimiter::new(config, store, clock).is_err());
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl RateLimitStore for FailingStore {
        async fn record_hit(
            &self,
            _key: &RateLimitKey,
            _policy: &RateLimitPolicy,
            _now: i64,
        ) -> RateLimitResult<WindowState> {
            Err(RateLimitError::Database(sqlx::Error::PoolClosed))
        }

        async fn window(&self, _key: &RateLimitKey) -> RateLimitResult<Option<WindowState>> {
            Err(RateLimitError::Database(sqlx::Error::PoolClosed))
        }

        async fn remove(&self, _key: &RateLimitKey) -> RateLimitResult<bool> {
            Err(RateLimitError::Database(sqlx::Error::PoolClosed))
        }

        async fn purge_expired(&self, _now: i64) -> RateLimitResult<u64> {
            Err(RateLimitError::Database(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let config = RateLimiterConfig::empty().with_policy("login", 5, 60);
        let limiter = RateLimiter::new(
            config,
            Arc::new(FailingStore),
            Arc::new(ManualClock::at_timestamp(START)),
        )
        .unwrap();

        let result = limiter.check_limit("login", "alice").await;
        assert!(matches!(result, Err(RateLimitError::Database(_))));

        // Unknown actions never reach the store
        assert!(limiter.check_limit("unknown", "alice").await.unwrap().allowed);
    }
}
