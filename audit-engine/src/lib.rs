//! Audit trail for PasteForge
//!
//! Records who did what, when and from where into two append-only sinks:
//!
//! - **Audit log** (`audit_logs`): user actions on pastes, comments and
//!   accounts, written after the state change succeeds
//! - **Security events** (`security_events`): suspected abuse, tagged with a
//!   risk level
//!
//! Callers pass a [`RequestContext`] explicitly with every write. Rows are
//! pruned by age with [`AuditLogger::cleanup_old_logs`] or on a schedule via
//! [`AuditLogger::spawn_retention_task`].
//!
//! # Example
//!
//! ```no_run
//! use audit_engine::{AuditConfig, AuditDetails, AuditEvent, AuditLogger, RequestContext};
//! use database_layer::DatabasePool;
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! # async fn run() -> audit_engine::AuditResult<()> {
//! let db = DatabasePool::in_memory().await?;
//! db.initialize_schema().await?;
//!
//! let audit = AuditLogger::with_database(db, AuditConfig::default());
//! let ctx = RequestContext::new(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)), "Mozilla/5.0")
//!     .with_user("42");
//!
//! audit
//!     .log(
//!         &ctx,
//!         AuditEvent::new("paste_create")
//!             .resource("paste", "abc123")
//!             .details(AuditDetails::new().with("visibility", "public")),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client_ip;
pub mod context;
pub mod details;
pub mod entry;
pub mod error;
pub mod filter;
pub mod logger;

pub use client_ip::{is_public_ip, ClientIpConfig, ClientIpResolver};
pub use context::RequestContext;
pub use details::{AuditDetails, DetailValue};
pub use entry::{AuditEvent, AuditLogEntry, RiskLevel, SecurityEvent, SecurityEventRecord, Severity};
pub use error::{AuditError, AuditResult};
pub use filter::{AuditLogFilter, SecurityEventFilter};
pub use logger::{AuditConfig, AuditLogger};
