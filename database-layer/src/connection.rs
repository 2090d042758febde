// Database connection management
use crate::error::{DatabaseError, DatabaseResult};
use crate::schema;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Connection settings for the shared SQLite store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite:pasteforge.db` or `sqlite::memory:`
    #[serde(default = "default_url")]
    pub url: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,

    /// How long to wait for a free pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Use write-ahead logging (ignored for in-memory databases)
    #[serde(default = "default_true")]
    pub enable_wal: bool,
}

fn default_url() -> String {
    "sqlite:pasteforge.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_secs() -> u64 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            enable_wal: true,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for an on-disk database file
    pub fn for_path(path: &str) -> Self {
        Self {
            url: format!("sqlite:{path}"),
            ..Self::default()
        }
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Pooled handle to the shared store
///
/// Cheap to clone; every clone shares the same underlying pool.
#[derive(Clone, Debug)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if missing) the database described by `config`
    pub async fn new(config: &DatabaseConfig) -> DatabaseResult<Self> {
        if config.max_connections == 0 {
            return Err(DatabaseError::InvalidConfig(
                "max_connections must be at least 1".to_string(),
            ));
        }

        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DatabaseError::InvalidConfig(format!("{}: {}", config.url, e)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let in_memory = config.is_in_memory();
        if config.enable_wal && !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to `:memory:` is its own database, so an in-memory
        // pool must hold exactly one connection that never gets recycled.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        info!(
            url = %config.url,
            max_connections = config.max_connections,
            in_memory,
            "Database connection pool created"
        );

        Ok(Self { pool })
    }

    /// Single-connection in-memory database, mostly for tests
    pub async fn in_memory() -> DatabaseResult<Self> {
        Self::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn initialize_schema(&self) -> DatabaseResult<()> {
        schema::initialize(&self.pool).await
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the pool can still run queries
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                false
            }
        }
    }

    /// Close the pool; later queries fail with `PoolClosed`
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
