//! Fixed-window rate limiting for PasteForge
//!
//! Request handlers call [`RateLimiter::check_limit`] with an action name
//! (`login`, `paste_create`, ...) and a caller identifier (user id or client
//! IP) before doing anything sensitive. Each action has its own
//! `(limit, window)` quota; the count resets at the end of the window rather
//! than sliding.
//!
//! All state lives in the shared SQLite `rate_limits` table. Each check is a
//! single upsert, so correctness under concurrent requests comes from the
//! database serializing writers, not from in-process locks.
//!
//! Actions without a configured policy are handled by
//! [`UnknownActionPolicy`], which defaults to letting them through.
//!
//! # Example
//!
//! ```no_run
//! use database_layer::{DatabaseConfig, DatabasePool};
//! use rate_limiter::{RateLimiter, RateLimiterConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabasePool::new(&DatabaseConfig::default()).await?;
//! db.initialize_schema().await?;
//!
//! let limiter = RateLimiter::with_database(RateLimiterConfig::default(), db)?;
//! let sweeper = limiter.spawn_sweeper(limiter.config().sweep_interval());
//!
//! let decision = limiter.check_limit("paste_create", "203.0.113.7").await?;
//! if !decision.allowed {
//!     println!("slow down, try again at {}", decision.reset_at);
//! }
//!
//! sweeper.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod limiter;
pub mod policy;
pub mod store;

pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{RateLimitDecision, RateLimiter};
pub use policy::{default_policies, RateLimitPolicy, RateLimiterConfig, UnknownActionPolicy};
pub use store::{RateLimitKey, RateLimitStore, SqliteRateLimitStore, WindowState};
