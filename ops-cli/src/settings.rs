// Configuration loading for the operations CLI
use audit_engine::AuditConfig;
use config::{Config, ConfigError, Environment, File};
use database_layer::DatabaseConfig;
use rate_limiter::RateLimiterConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `PASTEFORGE__DATABASE__URL`
pub const ENV_PREFIX: &str = "PASTEFORGE";

/// Top-level settings, read from `pasteforge.toml` and the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasteForgeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub rate_limits: RateLimiterConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Which background jobs `maintain` runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_true")]
    pub sweeper_enabled: bool,

    #[serde(default = "default_true")]
    pub retention_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweeper_enabled: true,
            retention_enabled: true,
        }
    }
}

impl PasteForgeConfig {
    /// Load `path` (optional) overlaid with `PASTEFORGE__*` environment variables
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Same as [`Self::load`], reading overrides from `env` instead of the
    /// process environment when given
    pub fn load_with_env(
        path: &Path,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
