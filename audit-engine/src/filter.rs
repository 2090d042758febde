//! Query filters for the audit and security-event trails
//!
//! Every field is optional; set fields are AND-ed together.

use crate::entry::{RiskLevel, Severity};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuditLogFilter {
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub severity: Option<Severity>,
    pub ip_address: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub until: Option<DateTime<Utc>>,
}

impl AuditLogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub(crate) fn push_where(&self, query: &mut QueryBuilder<'_, Sqlite>) {
        query.push(" WHERE 1 = 1");

        if let Some(user_id) = &self.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(action) = &self.action {
            query.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(resource_type) = &self.resource_type {
            query.push(" AND resource_type = ").push_bind(resource_type.clone());
        }
        if let Some(resource_id) = &self.resource_id {
            query.push(" AND resource_id = ").push_bind(resource_id.clone());
        }
        if let Some(severity) = self.severity {
            query.push(" AND severity = ").push_bind(severity.as_str());
        }
        if let Some(ip_address) = &self.ip_address {
            query.push(" AND ip_address = ").push_bind(ip_address.clone());
        }
        if let Some(since) = self.since {
            query.push(" AND created_at >= ").push_bind(since.timestamp());
        }
        if let Some(until) = self.until {
            query.push(" AND created_at < ").push_bind(until.timestamp());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SecurityEventFilter {
    pub event_type: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub ip_address: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl SecurityEventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = Some(risk_level);
        self
    }

    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub(crate) fn push_where(&self, query: &mut QueryBuilder<'_, Sqlite>) {
        query.push(" WHERE 1 = 1");

        if let Some(event_type) = &self.event_type {
            query.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if let Some(risk_level) = self.risk_level {
            query.push(" AND risk_level = ").push_bind(risk_level.as_str());
        }
        if let Some(ip_address) = &self.ip_address {
            query.push(" AND ip_address = ").push_bind(ip_address.clone());
        }
        if let Some(since) = self.since {
            query.push(" AND created_at >= ").push_bind(since.timestamp());
        }
    }
}
