//! Per-request identity passed explicitly to the audit logger

use crate::client_ip::ClientIpResolver;
use http::header::USER_AGENT;
use http::HeaderMap;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use uuid::Uuid;

/// Longest user agent string kept in audit rows
pub const MAX_USER_AGENT_LEN: usize = 512;

const UNKNOWN_USER_AGENT: &str = "unknown";

/// Who is acting and from where
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub user_id: Option<String>,
    pub ip_address: IpAddr,
    pub user_agent: String,
}

impl RequestContext {
    pub fn new(ip_address: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: None,
            ip_address,
            user_agent: truncate_user_agent(user_agent.into()),
        }
    }

    /// Build from request headers and the socket peer address
    pub fn from_headers(headers: &HeaderMap, peer: Option<IpAddr>, resolver: &ClientIpResolver) -> Self {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(UNKNOWN_USER_AGENT);

        Self::new(resolver.resolve(headers, peer), user_agent)
    }

    /// Context for scheduled jobs and CLI invocations
    pub fn system(component: &str) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), format!("pasteforge-{component}"))
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}

fn truncate_user_agent(user_agent: String) -> String {
    if user_agent.chars().count() <= MAX_USER_AGENT_LEN {
        user_agent
    } else {
        user_agent.chars().take(MAX_USER_AGENT_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("93.184.216.34"));

        let ctx = RequestContext::from_headers(&headers, None, &ClientIpResolver::default())
            .with_user("42");

        assert_eq!(ctx.user_agent, "Mozilla/5.0");
        assert_eq!(ctx.ip_address, "93.184.216.34".parse::<IpAddr>().unwrap());
        assert_eq!(ctx.user_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_missing_user_agent() {
        let ctx = RequestContext::from_headers(
            &HeaderMap::new(),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))),
            &ClientIpResolver::default(),
        );

        assert_eq!(ctx.user_agent, "unknown");
        assert_eq!(ctx.ip_address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(ctx.user_id.is_none());
    }

    #[test]
    fn test_long_user_agent_truncated() {
        let ctx = RequestContext::new(IpAddr::V4(Ipv4Addr::LOCALHOST), "é".repeat(600));
        assert_eq!(ctx.user_agent.chars().count(), MAX_USER_AGENT_LEN);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::system("ops");
        let b = RequestContext::system("ops");
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.user_agent, "pasteforge-ops");
    }
}
