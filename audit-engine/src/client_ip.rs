//! Client IP resolution from proxy headers
//!
//! Headers are checked in priority order and the first value that parses as
//! a public (non-private, non-reserved) address wins; otherwise the direct
//! peer address is used. Any client can set these headers, so without a
//! trusted reverse proxy rewriting them the result is only a hint. Set
//! `trust_proxy_headers = false` when the service is reachable directly.

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Header lookup order for client IP resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIpConfig {
    /// Whether forwarded headers are consulted at all
    #[serde(default = "default_true")]
    pub trust_proxy_headers: bool,

    /// Header names, highest priority first
    #[serde(default = "default_headers")]
    pub headers: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_headers() -> Vec<String> {
    [
        "client-ip",
        "x-forwarded-for",
        "x-forwarded",
        "x-cluster-client-ip",
        "forwarded-for",
        "forwarded",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl Default for ClientIpConfig {
    fn default() -> Self {
        Self {
            trust_proxy_headers: true,
            headers: default_headers(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    config: ClientIpConfig,
}

impl ClientIpResolver {
    pub fn new(config: ClientIpConfig) -> Self {
        Self { config }
    }

    /// Best guess at the originating client address
    ///
    /// Falls back to `peer`, then to `0.0.0.0` when there is no peer either.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> IpAddr {
        if self.config.trust_proxy_headers {
            for name in &self.config.headers {
                let forwarded = name.eq_ignore_ascii_case("forwarded");

                for value in headers.get_all(name.as_str()) {
                    let Ok(value) = value.to_str() else {
                        continue;
                    };

                    let found = if forwarded {
                        forwarded_for_values(value).find_map(parse_public)
                    } else {
                        value.split(',').find_map(parse_public)
                    };

                    if let Some(ip) = found {
                        return ip;
                    }
                }
            }
        }

        peer.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

/// `for=` parameters of an RFC 7239 `Forwarded` header
fn forwarded_for_values(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .flat_map(|element| element.split(';'))
        .filter_map(|pair| {
            let (key, val) = pair.split_once('=')?;
            key.trim().eq_ignore_ascii_case("for").then_some(val)
        })
}

fn parse_public(candidate: &str) -> Option<IpAddr> {
    parse_candidate(candidate).filter(is_public_ip)
}

/// Accepts bare addresses, `ip:port`, `[v6]` and `[v6]:port`, optionally quoted
fn parse_candidate(candidate: &str) -> Option<IpAddr> {
    let candidate = candidate.trim().trim_matches('"');

    if let Ok(ip) = candidate.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return Some(addr.ip());
    }

    let inner = candidate.strip_prefix('[')?;
    let (host, _) = inner.split_once(']')?;
    host.parse::<Ipv6Addr>().ok().map(IpAddr::V6)
}

/// True for addresses outside every private and reserved range
pub fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(*v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();

    let reserved = a == 0
        || a == 10
        || a == 127
        || a >= 224
        || (a == 100 && (64..=127).contains(&b))
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 0 && (c == 0 || c == 2))
        || (a == 192 && b == 168)
        || (a == 198 && (b == 18 || b == 19))
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113);

    !reserved
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(v4);
    }

    let first = ip.segments()[0];
    let reserved = ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
        || (first == 0x2001 && ip.segments()[1] == 0x0db8);

    !reserved
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_public_and_reserved_ranges() {
        for public in ["8.8.8.8", "93.184.216.34", "172.32.0.1", "2606:4700::1111"] {
            assert!(is_public_ip(&ip(public)), "{public} should be public");
        }

        for reserved in [
            "0.0.0.0",
            "10.1.2.3",
            "100.64.0.1",
            "127.0.0.1",
            "169.254.10.10",
            "172.16.0.1",
            "192.168.1.1",
            "192.0.2.5",
            "224.0.0.1",
            "255.255.255.255",
            "::",
            "::1",
            "fd00::1",
            "fe80::1",
            "2001:db8::1",
            "ff02::1",
            "::ffff:192.168.1.1",
        ] {
            assert!(!is_public_ip(&ip(reserved)), "{reserved} should be reserved");
        }
    }

    #[test]
    fn test_header_priority() {
        let resolver = ClientIpResolver::default();
        let map = headers(&[
            ("x-forwarded-for", "93.184.216.34"),
            ("client-ip", "8.8.4.4"),
        ]);

        assert_eq!(resolver.resolve(&map, Some(ip("10.0.0.5"))), ip("8.8.4.4"));
    }

    #[test]
    fn test_skips_private_entries_in_forwarded_for() {
        let resolver = ClientIpResolver::default();
        let map = headers(&[("x-forwarded-for", "10.0.0.1, unknown, 93.184.216.34, 8.8.8.8")]);

        assert_eq!(resolver.resolve(&map, None), ip("93.184.216.34"));
    }

    #[test]
    fn test_private_header_falls_through_to_next_header() {
        let resolver = ClientIpResolver::default();
        let map = headers(&[
            ("client-ip", "192.168.0.10"),
            ("x-cluster-client-ip", "1.1.1.1"),
        ]);

        assert_eq!(resolver.resolve(&map, None), ip("1.1.1.1"));
    }

    #[test]
    fn test_forwarded_header() {
        let resolver = ClientIpResolver::default();
        let map = headers(&[(
            "forwarded",
            "for=192.168.0.1;proto=https, for=\"[2606:4700::1111]:4711\";by=10.0.0.1",
        )]);

        assert_eq!(resolver.resolve(&map, None), ip("2606:4700::1111"));
    }

    #[test]
    fn test_ip_with_port() {
        let resolver = ClientIpResolver::default();
        let map = headers(&[("x-forwarded", "93.184.216.34:51234")]);

        assert_eq!(resolver.resolve(&map, None), ip("93.184.216.34"));
    }

    #[test]
    fn test_falls_back_to_peer() {
        let resolver = ClientIpResolver::default();
        let map = headers(&[("x-forwarded-for", "127.0.0.1")]);

        assert_eq!(resolver.resolve(&map, Some(ip("10.0.0.7"))), ip("10.0.0.7"));
        assert_eq!(resolver.resolve(&map, None), ip("0.0.0.0"));
    }

    #[test]
    fn test_untrusted_headers_ignored() {
        let resolver = ClientIpResolver::new(ClientIpConfig {
            trust_proxy_headers: false,
            ..ClientIpConfig::default()
        });
        let map = headers(&[("x-forwarded-for", "8.8.8.8")]);

        assert_eq!(resolver.resolve(&map, Some(ip("10.0.0.7"))), ip("10.0.0.7"));
    }
}
