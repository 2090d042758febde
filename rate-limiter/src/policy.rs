//! Per-action quotas and limiter-wide settings

use crate::error::{RateLimitError, RateLimitResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Quota for one action: at most `limit` requests per `window_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window_secs: u32,
}

impl RateLimitPolicy {
    pub const fn new(limit: u32, window_secs: u32) -> Self {
        Self { limit, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_secs))
    }

    /// `max(0, limit - count)` for a window that has seen `count` requests
    pub fn remaining_after(&self, count: i64) -> u32 {
        let remaining = i64::from(self.limit).saturating_sub(count).max(0);
        u32::try_from(remaining).unwrap_or(0)
    }

    fn validate(&self, action: &str) -> RateLimitResult<()> {
        let reason = if self.limit == 0 {
            "limit must be at least 1"
        } else if self.window_secs == 0 {
            "window must be at least one second"
        } else {
            return Ok(());
        };

        Err(RateLimitError::InvalidPolicy {
            action: action.to_string(),
            reason: reason.to_string(),
        })
    }
}

/// What to do with an action that has no configured policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownActionPolicy {
    /// Let the request through without counting it
    #[default]
    Allow,
    /// Reject the request outright
    Deny,
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// When false every request is allowed and storage is never touched
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Handling of actions missing from `policies`
    #[serde(default)]
    pub unknown_action: UnknownActionPolicy,

    /// How often the background sweeper deletes expired windows
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Quota per action name
    #[serde(default = "default_policies")]
    pub policies: BTreeMap<String, RateLimitPolicy>,
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// Quotas for PasteForge's sensitive operations
pub fn default_policies() -> BTreeMap<String, RateLimitPolicy> {
    [
        ("login", RateLimitPolicy::new(5, 900)),
        ("register", RateLimitPolicy::new(3, 3600)),
        ("password_reset", RateLimitPolicy::new(3, 3600)),
        ("paste_create", RateLimitPolicy::new(10, 900)),
        ("comment_create", RateLimitPolicy::new(20, 600)),
        ("message_send", RateLimitPolicy::new(30, 3600)),
        ("paste_flag", RateLimitPolicy::new(5, 3600)),
        ("api_request", RateLimitPolicy::new(100, 60)),
    ]
    .into_iter()
    .map(|(action, policy)| (action.to_string(), policy))
    .collect()
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unknown_action: UnknownActionPolicy::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
            policies: default_policies(),
        }
    }
}

impl RateLimiterConfig {
    /// Configuration with no policies at all
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, action: impl Into<String>, limit: u32, window_secs: u32) -> Self {
        self.policies
            .insert(action.into(), RateLimitPolicy::new(limit, window_secs));
        self
    }

    pub fn with_unknown_action(mut self, policy: UnknownActionPolicy) -> Self {
        self.unknown_action = policy;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn policy(&self, action: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(action)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject zero limits and zero-length windows
    pub fn validate(&self) -> RateLimitResult<()> {
        for (action, policy) in &self.policies {
            policy.validate(action)?;
        }
        Ok(())
    }
}
