// Command-line arguments
use audit_engine::{RiskLevel, Severity};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// PasteForge operations tool
#[derive(Parser, Debug)]
#[command(name = "pasteforge-ops", version)]
#[command(about = "Rate limit and audit trail maintenance for PasteForge")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PASTEFORGE_CONFIG", default_value = "pasteforge.toml")]
    pub config: PathBuf,

    /// Override the database URL from the configuration
    #[arg(long)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create tables and indexes
    InitDb,

    /// Run the expired-window sweeper and audit retention until Ctrl-C
    Maintain,

    /// Prune audit rows and security events once
    CleanupLogs {
        /// Retention in days (defaults to the configured value)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Print audit log entries as JSON lines, newest first
    AuditLogs(AuditLogsArgs),

    /// Print security events as JSON lines, newest first
    SecurityEvents(SecurityEventsArgs),

    /// Inspect or clear a rate limit window
    RateLimit {
        #[command(subcommand)]
        command: RateLimitCommand,
    },

    /// Spend one request and print the decision
    Check(LimitTarget),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AuditLogsArgs {
    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub action: Option<String>,

    /// info, warning, error or critical
    #[arg(long)]
    pub severity: Option<Severity>,

    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SecurityEventsArgs {
    #[arg(long)]
    pub event_type: Option<String>,

    /// low, medium or high
    #[arg(long)]
    pub risk: Option<RiskLevel>,

    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitCommand {
    /// Show the current window without spending a request
    Status(LimitTarget),

    /// Delete the current window
    Reset(LimitTarget),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct LimitTarget {
    #[arg(long)]
    pub action: String,

    /// User id or client IP the window is keyed on
    #[arg(long)]
    pub identifier: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_audit_logs() {
        let cli = Cli::parse_from([
            "pasteforge-ops",
            "audit-logs",
            "--user",
            "42",
            "--severity",
            "warning",
            "--limit",
            "5",
        ]);

        assert_eq!(cli.config, PathBuf::from("pasteforge.toml"));
        assert_eq!(
            cli.command,
            Command::AuditLogs(AuditLogsArgs {
                user: Some("42".to_string()),
                action: None,
                severity: Some(Severity::Warning),
                limit: 5,
                offset: 0,
            })
        );
    }

    #[test]
    fn test_parse_rate_limit_reset() {
        let cli = Cli::parse_from([
            "pasteforge-ops",
            "--database-url",
            "sqlite::memory:",
            "rate-limit",
            "reset",
            "--action",
            "login",
            "--identifier",
            "203.0.113.9",
        ]);

        assert_eq!(cli.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(
            cli.command,
            Command::RateLimit {
                command: RateLimitCommand::Reset(LimitTarget {
                    action: "login".to_string(),
                    identifier: "203.0.113.9".to_string(),
                }),
            }
        );
    }

    #[test]
    fn test_invalid_severity_rejected() {
        let result = Cli::try_parse_from(["pasteforge-ops", "audit-logs", "--severity", "loud"]);
        assert!(result.is_err());
    }
}
