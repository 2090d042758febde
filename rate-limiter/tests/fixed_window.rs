//! End-to-end checks against an on-disk SQLite database

use database_layer::{schema, DatabaseConfig, DatabasePool, ManualClock};
use rate_limiter::{RateLimitError, RateLimiter, RateLimiterConfig, SqliteRateLimitStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

const START: i64 = 1_700_000_000;

async fn create_test_db(temp_file: &NamedTempFile) -> DatabasePool {
    let config = DatabaseConfig {
        max_connections: 8,
        ..DatabaseConfig::for_path(temp_file.path().to_str().unwrap())
    };
    let db = DatabasePool::new(&config).await.unwrap();
    db.initialize_schema().await.unwrap();
    db
}

fn limiter_with_clock(db: &DatabasePool, config: RateLimiterConfig) -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_timestamp(START));
    let limiter = RateLimiter::new(
        config,
        Arc::new(SqliteRateLimitStore::new(db.clone())),
        clock.clone(),
    )
    .unwrap();
    (limiter, clock)
}

#[tokio::test]
async fn test_ten_per_fifteen_minutes() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = create_test_db(&temp_file).await;
    let (limiter, clock) = limiter_with_clock(
        &db,
        RateLimiterConfig::empty().with_policy("paste_create", 10, 900),
    );

    let mut remaining = Vec::new();
    for _ in 0..10 {
        let decision = limiter.check_limit("paste_create", "198.51.100.20").await.unwrap();
        assert!(decision.allowed);
        remaining.push(decision.remaining);
    }
    assert_eq!(remaining, vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);

    // Eleventh call, still inside the window
    clock.advance_secs(899);
    let rejected = limiter.check_limit("paste_create", "198.51.100.20").await.unwrap();
    assert!(!rejected.allowed);
    assert_eq!(rejected.remaining, 0);
    assert_eq!(rejected.reset_at.timestamp(), START + 900);

    // Just past the window: allowed again with a fresh window
    clock.advance_secs(2);
    let fresh = limiter.check_limit("paste_create", "198.51.100.20").await.unwrap();
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 9);
    assert_eq!(fresh.reset_at.timestamp(), START + 901 + 900);

    // Replaced in place, never accumulated
    assert_eq!(schema::row_count(db.pool(), schema::RATE_LIMITS_TABLE).await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_first_requests_share_one_window() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = create_test_db(&temp_file).await;
    let (limiter, _clock) = limiter_with_clock(
        &db,
        RateLimiterConfig::empty().with_policy("login", 10, 900),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check_limit("login", "alice").await })
        })
        .collect();

    let mut remaining = Vec::new();
    for handle in handles {
        let decision = handle.await.unwrap().unwrap();
        assert!(decision.allowed);
        remaining.push(decision.remaining);
    }
    remaining.sort_unstable();

    // Every request counted exactly once in the same window
    assert_eq!(remaining, vec![2, 3, 4, 5, 6, 7, 8, 9]);

    let status = limiter.status("login", "alice").await.unwrap();
    assert_eq!(status.remaining, 2);
}

#[tokio::test]
async fn test_concurrent_requests_never_exceed_limit() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = create_test_db(&temp_file).await;
    let (limiter, _clock) = limiter_with_clock(
        &db,
        RateLimiterConfig::empty().with_policy("register", 3, 3600),
    );

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check_limit("register", "203.0.113.9").await })
        })
        .collect();

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().allowed {
            allowed += 1;
        }
    }

    assert_eq!(allowed, 3);
}

#[tokio::test]
async fn test_storage_failure_reaches_caller() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = create_test_db(&temp_file).await;
    let (limiter, _clock) = limiter_with_clock(
        &db,
        RateLimiterConfig::empty().with_policy("login", 5, 900),
    );

    db.close().await;

    let result = limiter.check_limit("login", "alice").await;
    assert!(matches!(result, Err(RateLimitError::Database(_))));
}

#[tokio::test]
async fn test_sweeper_removes_expired_windows() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = create_test_db(&temp_file).await;
    let (limiter, clock) = limiter_with_clock(
        &db,
        RateLimiterConfig::empty().with_policy("login", 5, 60),
    );

    limiter.check_limit("login", "alice").await.unwrap();
    limiter.check_limit("login", "bob").await.unwrap();
    clock.advance_secs(30);
    limiter.check_limit("login", "carol").await.unwrap();

    // alice and bob expire, carol is still live
    clock.advance_secs(31);

    let sweeper = limiter.spawn_sweeper(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(150)).await;
    sweeper.shutdown().await;

    assert_eq!(schema::row_count(db.pool(), schema::RATE_LIMITS_TABLE).await.unwrap(), 1);
    assert_eq!(limiter.status("login", "carol").await.unwrap().remaining, 4);
}
