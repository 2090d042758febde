// Tracing setup
use anyhow::{anyhow, Result};
use std::env;
use std::io::{self, IsTerminal};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Environment variable selecting `development` (default) or `production` output
pub const ENV_MODE_VAR: &str = "PASTEFORGE_ENV";

fn default_directives(level: Level) -> String {
    format!(
        "pasteforge_ops={level},rate_limiter={level},audit_engine={level},\
         database_layer={level},audit={level},sqlx=warn"
    )
}

/// Human-readable output in development, JSON lines in production
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let is_development =
        env::var(ENV_MODE_VAR).unwrap_or_else(|_| "development".to_string()) == "development";
    let use_colors = env::var("NO_COLOR").is_err() && io::stderr().is_terminal();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives(level).into());

    let result = if is_development {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_colors)
                    .with_level(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .json(),
            )
            .try_init()
    };

    result.map_err(|e| anyhow!("Failed to initialize tracing: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_audit_target() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.contains("audit=debug"));
        assert!(directives.contains("sqlx=warn"));
        assert!(directives.parse::<EnvFilter>().is_ok());
    }
}
