//! Table layout shared by the rate limiter and the audit engine.
//!
//! All timestamps are stored as whole seconds since the Unix epoch.

use crate::error::{DatabaseError, DatabaseResult};
use sqlx::sqlite::SqlitePool;
use tracing::debug;

pub const RATE_LIMITS_TABLE: &str = "rate_limits";
pub const AUDIT_LOGS_TABLE: &str = "audit_logs";
pub const SECURITY_EVENTS_TABLE: &str = "security_events";

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS rate_limits (
        key TEXT PRIMARY KEY,
        identifier TEXT NOT NULL,
        action TEXT NOT NULL,
        request_count INTEGER NOT NULL DEFAULT 1,
        window_start INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_rate_limits_expires ON rate_limits(expires_at)",
    r#"
    CREATE TABLE IF NOT EXISTS audit_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT,
        action TEXT NOT NULL,
        resource_type TEXT,
        resource_id TEXT,
        ip_address TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        details TEXT,
        severity TEXT NOT NULL DEFAULT 'info'
            CHECK (severity IN ('info', 'warning', 'error', 'critical')),
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_user ON audit_logs(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_action ON audit_logs(action)",
    r#"
    CREATE TABLE IF NOT EXISTS security_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        ip_address TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        details TEXT,
        risk_level TEXT NOT NULL DEFAULT 'low'
            CHECK (risk_level IN ('low', 'medium', 'high')),
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_security_events_created ON security_events(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_security_events_type ON security_events(event_type)",
];

/// Idempotently create every table and index
pub async fn initialize(pool: &SqlitePool) -> DatabaseResult<()> {
    let mut tx = pool.begin().await?;

    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::SchemaError(e.to_string()))?;
    }

    tx.commit().await?;

    debug!(statements = STATEMENTS.len(), "Schema initialized");
    Ok(())
}

/// Number of rows currently in `table`
///
/// Only accepts the table names defined in this module.
pub async fn row_count(pool: &SqlitePool, table: &str) -> DatabaseResult<i64> {
    if ![RATE_LIMITS_TABLE, AUDIT_LOGS_TABLE, SECURITY_EVENTS_TABLE].contains(&table) {
        return Err(DatabaseError::QueryFailed(format!("unknown table: {table}")));
    }

    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}
