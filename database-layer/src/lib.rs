//! Shared persistence layer for PasteForge Guard
//!
//! Both the rate limiter and the audit engine keep all of their state in a
//! single SQLite database and rely on it to serialize conflicting writes.
//! This crate owns:
//!
//! - **Connection management**: a cloneable [`DatabasePool`] over `sqlx`'s
//!   SQLite pool, WAL journaling and a busy timeout for concurrent writers
//! - **Schema**: idempotent creation of the `rate_limits`, `audit_logs` and
//!   `security_events` tables
//! - **Time**: the [`Clock`] abstraction used for window and retention math
//! - **Maintenance**: [`spawn_periodic`] for sweeps that run on their own
//!   schedule instead of piggybacking on requests
//!
//! # Example
//!
//! ```no_run
//! use database_layer::{DatabaseConfig, DatabasePool};
//!
//! # async fn run() -> database_layer::DatabaseResult<()> {
//! let db = DatabasePool::new(&DatabaseConfig::for_path("pasteforge.db")).await?;
//! db.initialize_schema().await?;
//! assert!(db.is_healthy().await);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod connection;
pub mod error;
pub mod maintenance;
pub mod schema;

pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{DatabaseConfig, DatabasePool};
pub use error::{DatabaseError, DatabaseResult};
pub use maintenance::{spawn_periodic, PeriodicTask};
