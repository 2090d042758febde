// Subcommand implementations
use crate::cli::{AuditLogsArgs, Command, LimitTarget, RateLimitCommand, SecurityEventsArgs};
use crate::settings::PasteForgeConfig;
use anyhow::{Context, Result};
use audit_engine::{
    AuditDetails, AuditEvent, AuditLogFilter, AuditLogger, RequestContext, SecurityEventFilter,
    Severity,
};
use chrono::Utc;
use database_layer::{schema, DatabasePool};
use rate_limiter::{RateLimitDecision, RateLimiter};
use serde::Serialize;
use std::io::Write;
use tracing::info;

/// Everything a subcommand needs, built once from configuration
#[derive(Debug, Clone)]
pub struct Services {
    pub config: PasteForgeConfig,
    pub db: DatabasePool,
    pub limiter: RateLimiter,
    pub audit: AuditLogger,
}

impl Services {
    /// Open the configured database and build the limiter and audit logger
    pub async fn connect(config: PasteForgeConfig) -> Result<Self> {
        let db = DatabasePool::new(&config.database)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.url))?;
        Self::from_parts(config, db)
    }

    pub fn from_parts(config: PasteForgeConfig, db: DatabasePool) -> Result<Self> {
        let limiter = RateLimiter::with_database(config.rate_limits.clone(), db.clone())
            .context("Invalid rate limit configuration")?;
        let audit = AuditLogger::with_database(db.clone(), config.audit.clone());

        Ok(Self {
            config,
            db,
            limiter,
            audit,
        })
    }
}

#[derive(Serialize)]
struct DecisionOutput<'a> {
    action: &'a str,
    identifier: &'a str,
    allowed: bool,
    remaining: u32,
    limit: Option<u32>,
    reset_at: String,
    retry_after_secs: u64,
}

impl<'a> DecisionOutput<'a> {
    fn new(target: &'a LimitTarget, decision: &RateLimitDecision) -> Self {
        Self {
            action: &target.action,
            identifier: &target.identifier,
            allowed: decision.allowed,
            remaining: decision.remaining,
            limit: decision.limit,
            reset_at: decision.reset_at.to_rfc3339(),
            retry_after_secs: decision.retry_after(Utc::now()).as_secs(),
        }
    }
}

fn write_json_line<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value).context("Failed to encode output")?;
    writeln!(out)?;
    Ok(())
}

/// Run one subcommand, writing its output to `out`
pub async fn execute(command: Command, services: &Services, out: &mut impl Write) -> Result<()> {
    match command {
        Command::InitDb => init_db(services, out).await,
        Command::Maintain => maintain(services).await,
        Command::CleanupLogs { days } => cleanup_logs(services, days, out).await,
        Command::AuditLogs(args) => audit_logs(services, &args, out).await,
        Command::SecurityEvents(args) => security_events(services, &args, out).await,
        Command::RateLimit {
            command: RateLimitCommand::Status(target),
        } => rate_limit_status(services, &target, out).await,
        Command::RateLimit {
            command: RateLimitCommand::Reset(target),
        } => rate_limit_reset(services, &target, out).await,
        Command::Check(target) => check(services, &target, out).await,
    }
}

async fn init_db(services: &Services, out: &mut impl Write) -> Result<()> {
    services
        .db
        .initialize_schema()
        .await
        .context("Failed to initialize schema")?;

    for table in [
        schema::RATE_LIMITS_TABLE,
        schema::AUDIT_LOGS_TABLE,
        schema::SECURITY_EVENTS_TABLE,
    ] {
        let rows = schema::row_count(services.db.pool(), table).await?;
        writeln!(out, "{table}: {rows} rows")?;
    }
    Ok(())
}

async fn maintain(services: &Services) -> Result<()> {
    let maintenance = &services.config.maintenance;
    let mut tasks = Vec::new();

    if maintenance.sweeper_enabled {
        tasks.push(
            services
                .limiter
                .spawn_sweeper(services.config.rate_limits.sweep_interval()),
        );
    }
    if maintenance.retention_enabled {
        tasks.push(services.audit.spawn_retention_task(
            services.config.audit.retention_days,
            services.config.audit.retention_interval(),
        ));
    }

    if tasks.is_empty() {
        info!("No maintenance tasks enabled, exiting");
        return Ok(());
    }

    info!(tasks = tasks.len(), "Maintenance running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    for task in tasks {
        task.shutdown().await;
    }
    Ok(())
}

async fn cleanup_logs(services: &Services, days: Option<u32>, out: &mut impl Write) -> Result<()> {
    let days = days.unwrap_or(services.config.audit.retention_days);
    let deleted = services.audit.cleanup_old_logs(days).await?;

    writeln!(out, "deleted {deleted} rows older than {days} days")?;
    Ok(())
}

async fn audit_logs(services: &Services, args: &AuditLogsArgs, out: &mut impl Write) -> Result<()> {
    let filter = AuditLogFilter {
        user_id: args.user.clone(),
        action: args.action.clone(),
        severity: args.severity,
        ..AuditLogFilter::default()
    };

    for entry in services
        .audit
        .get_audit_logs(&filter, args.limit, args.offset)
        .await?
    {
        write_json_line(out, &entry)?;
    }
    Ok(())
}

async fn security_events(
    services: &Services,
    args: &SecurityEventsArgs,
    out: &mut impl Write,
) -> Result<()> {
    let filter = SecurityEventFilter {
        event_type: args.event_type.clone(),
        risk_level: args.risk,
        ..SecurityEventFilter::default()
    };

    for event in services
        .audit
        .get_security_events(&filter, args.limit, args.offset)
        .await?
    {
        write_json_line(out, &event)?;
    }
    Ok(())
}

async fn rate_limit_status(services: &Services, target: &LimitTarget, out: &mut impl Write) -> Result<()> {
    let decision = services
        .limiter
        .status(&target.action, &target.identifier)
        .await?;
    write_json_line(out, &DecisionOutput::new(target, &decision))
}

async fn rate_limit_reset(services: &Services, target: &LimitTarget, out: &mut impl Write) -> Result<()> {
    let removed = services
        .limiter
        .reset(&target.action, &target.identifier)
        .await?;

    services
        .audit
        .log(
            &RequestContext::system("ops"),
            AuditEvent::new("rate_limit_reset")
                .resource("rate_limit", target.action.as_str())
                .severity(Severity::Warning)
                .details(
                    AuditDetails::new()
                        .with("identifier", target.identifier.as_str())
                        .with("removed", removed),
                ),
        )
        .await?;

    writeln!(
        out,
        "{} window for {} on {}",
        if removed { "cleared" } else { "no" },
        target.identifier,
        target.action
    )?;
    Ok(())
}

async fn check(services: &Services, target: &LimitTarget, out: &mut impl Write) -> Result<()> {
    let decision = services
        .limiter
        .check_limit(&target.action, &target.identifier)
        .await?;
    write_json_line(out, &DecisionOutput::new(target, &decision))
}
