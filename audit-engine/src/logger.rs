//! Audit trail and security event sinks
//!
//! Every write lands in SQLite and is mirrored as a `tracing` event on the
//! `audit` target. Actions in the best-effort set never fail the caller:
//! persistence errors are traced and swallowed. Everything else propagates.

use crate::client_ip::{ClientIpConfig, ClientIpResolver};
use crate::context::RequestContext;
use crate::entry::{AuditEvent, AuditLogEntry, SecurityEvent, SecurityEventRecord};
use crate::error::{AuditError, AuditResult};
use crate::filter::{AuditLogFilter, SecurityEventFilter};
use chrono::{DateTime, Utc};
use database_layer::{spawn_periodic, Clock, DatabasePool, PeriodicTask, SystemClock};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SECONDS_PER_DAY: i64 = 86_400;

const AUDIT_COLUMNS: &str = "SELECT id, user_id, action, resource_type, resource_id, ip_address, \
     user_agent, details, severity, created_at FROM audit_logs";

const SECURITY_COLUMNS: &str = "SELECT id, event_type, ip_address, user_agent, details, \
     risk_level, created_at FROM security_events";

/// Audit logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// When false, every write is a no-op
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Age in days after which rows are pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// How often the retention task runs
    #[serde(default = "default_retention_interval_secs")]
    pub retention_interval_secs: u64,

    /// Actions whose persistence failures are swallowed
    #[serde(default = "default_best_effort_actions")]
    pub best_effort_actions: BTreeSet<String>,

    #[serde(default)]
    pub client_ip: ClientIpConfig,
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    90
}

fn default_retention_interval_secs() -> u64 {
    86_400
}

fn default_best_effort_actions() -> BTreeSet<String> {
    ["user_login_success", "paste_view", "user_logout"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
            retention_interval_secs: default_retention_interval_secs(),
            best_effort_actions: default_best_effort_actions(),
            client_ip: ClientIpConfig::default(),
        }
    }
}

impl AuditConfig {
    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_secs)
    }

    pub fn is_best_effort(&self, action: &str) -> bool {
        self.best_effort_actions.contains(action)
    }
}

/// Writer and reader for the `audit_logs` and `security_events` tables
///
/// Cheap to clone; clones share the pool, configuration and clock.
#[derive(Clone, Debug)]
pub struct AuditLogger {
    db: DatabasePool,
    config: Arc<AuditConfig>,
    resolver: ClientIpResolver,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    pub fn new(db: DatabasePool, config: AuditConfig, clock: Arc<dyn Clock>) -> Self {
        let resolver = ClientIpResolver::new(config.client_ip.clone());
        Self {
            db,
            config: Arc::new(config),
            resolver,
            clock,
        }
    }

    /// Logger on the system clock
    pub fn with_database(db: DatabasePool, config: AuditConfig) -> Self {
        Self::new(db, config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Request context using this logger's client-IP settings
    pub fn request_context(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> RequestContext {
        RequestContext::from_headers(headers, peer, &self.resolver)
    }

    /// Append one row to the audit trail
    ///
    /// Returns the new row id, or `None` when logging is disabled or a
    /// best-effort write was dropped.
    pub async fn log(&self, ctx: &RequestContext, event: AuditEvent) -> AuditResult<Option<i64>> {
        if !self.config.enabled {
            return Ok(None);
        }
        if event.action.trim().is_empty() {
            return Err(AuditError::Validation("action must not be empty".to_string()));
        }

        let details = event.details.as_ref().map(|d| d.to_storage_string());
        let created_at = self.clock.unix_timestamp();

        info!(
            target: "audit",
            request_id = %ctx.request_id,
            user_id = ?ctx.user_id,
            action = %event.action,
            resource_type = ?event.resource_type,
            resource_id = ?event.resource_id,
            ip_address = %ctx.ip_address,
            severity = %event.severity,
            "Audit event"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs
                (user_id, action, resource_type, resource_id, ip_address, user_agent,
                 details, severity, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ctx.user_id)
        .bind(&event.action)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(ctx.ip_address.to_string())
        .bind(&ctx.user_agent)
        .bind(details)
        .bind(event.severity.as_str())
        .bind(created_at)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(done) => Ok(Some(done.last_insert_rowid())),
            Err(e) if self.config.is_best_effort(&event.action) => {
                warn!(
                    action = %event.action,
                    request_id = %ctx.request_id,
                    error = %e,
                    "Dropped best-effort audit entry"
                );
                Ok(None)
            }
            Err(e) => {
                error!(
                    action = %event.action,
                    request_id = %ctx.request_id,
                    error = %e,
                    "Failed to store audit entry"
                );
                Err(e.into())
            }
        }
    }

    /// Append one row to the security event trail; failures always propagate
    pub async fn log_security_event(
        &self,
        ctx: &RequestContext,
        record: SecurityEventRecord,
    ) -> AuditResult<Option<i64>> {
        if !self.config.enabled {
            return Ok(None);
        }
        if record.event_type.trim().is_empty() {
            return Err(AuditError::Validation("event_type must not be empty".to_string()));
        }

        let details = record.details.as_ref().map(|d| d.to_storage_string());
        let created_at = self.clock.unix_timestamp();

        warn!(
            target: "audit",
            request_id = %ctx.request_id,
            event_type = %record.event_type,
            ip_address = %ctx.ip_address,
            risk_level = %record.risk_level,
            "Security event"
        );

        let done = sqlx::query(
            r#"
            INSERT INTO security_events
                (event_type, ip_address, user_agent, details, risk_level, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.event_type)
        .bind(ctx.ip_address.to_string())
        .bind(&ctx.user_agent)
        .bind(details)
        .bind(record.risk_level.as_str())
        .bind(created_at)
        .execute(self.db.pool())
        .await?;

        Ok(Some(done.last_insert_rowid()))
    }

    /// Matching audit rows, newest first
    pub async fn get_audit_logs(
        &self,
        filter: &AuditLogFilter,
        limit: u32,
        offset: u32,
    ) -> AuditResult<Vec<AuditLogEntry>> {
        let mut query = QueryBuilder::<Sqlite>::new(AUDIT_COLUMNS);
        filter.push_where(&mut query);
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(offset));

        let rows = query.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(audit_entry_from_row).collect()
    }

    pub async fn count_audit_logs(&self, filter: &AuditLogFilter) -> AuditResult<u64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM audit_logs");
        filter.push_where(&mut query);

        let row = query.build().fetch_one(self.db.pool()).await?;
        let total: i64 = row.try_get("total")?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Matching security events, newest first
    pub async fn get_security_events(
        &self,
        filter: &SecurityEventFilter,
        limit: u32,
        offset: u32,
    ) -> AuditResult<Vec<SecurityEvent>> {
        let mut query = QueryBuilder::<Sqlite>::new(SECURITY_COLUMNS);
        filter.push_where(&mut query);
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(offset));

        let rows = query.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(security_event_from_row).collect()
    }

    /// Delete rows older than `retention_days` from both trails
    ///
    /// Rows created exactly at the cutoff are kept. Returns the combined
    /// number of deleted rows.
    pub async fn cleanup_old_logs(&self, retention_days: u32) -> AuditResult<u64> {
        let cutoff = self
            .clock
            .unix_timestamp()
            .saturating_sub(i64::from(retention_days).saturating_mul(SECONDS_PER_DAY));

        let mut tx = self.db.pool().begin().await?;

        let audit_deleted = sqlx::query("DELETE FROM audit_logs WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let security_deleted = sqlx::query("DELETE FROM security_events WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        let total = audit_deleted + security_deleted;
        if total > 0 {
            info!(
                retention_days,
                audit_deleted,
                security_deleted,
                "Cleaned up old audit logs"
            );
        }
        Ok(total)
    }

    /// Run `cleanup_old_logs(retention_days)` every `interval`
    pub fn spawn_retention_task(&self, retention_days: u32, interval: Duration) -> PeriodicTask {
        let logger = self.clone();
        spawn_periodic("audit_retention", interval, move || {
            let logger = logger.clone();
            async move { logger.cleanup_old_logs(retention_days).await }
        })
    }
}

fn timestamp_from_row(row: &SqliteRow) -> AuditResult<DateTime<Utc>> {
    let created_at: i64 = row.try_get("created_at")?;
    DateTime::from_timestamp(created_at, 0)
        .ok_or_else(|| AuditError::InvalidRecord(format!("created_at out of range: {created_at}")))
}

/// Stored details are JSON text; anything else is surfaced as a plain string
fn details_from_row(row: &SqliteRow) -> AuditResult<Option<JsonValue>> {
    let raw: Option<String> = row.try_get("details")?;
    Ok(raw.map(|raw| serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw))))
}

fn audit_entry_from_row(row: &SqliteRow) -> AuditResult<AuditLogEntry> {
    let severity: String = row.try_get("severity")?;

    Ok(AuditLogEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action: row.try_get("action")?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        details: details_from_row(row)?,
        severity: severity.parse()?,
        created_at: timestamp_from_row(row)?,
    })
}

fn security_event_from_row(row: &SqliteRow) -> AuditResult<SecurityEvent> {
    let risk_level: String = row.try_get("risk_level")?;

    Ok(SecurityEvent {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        details: details_from_row(row)?,
        risk_level: risk_level.parse()?,
        created_at: timestamp_from_row(row)?,
    })
}
