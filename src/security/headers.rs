//! Client address resolution from proxy headers.
//!
//! # Responsibilities
//! - Derive the key used for all per-client state
//! - Honor `X-Forwarded-For` and `X-Real-IP` only when configured to trust them
//!
//! # Design Decisions
//! - Precedence: first `X-Forwarded-For` entry → `X-Real-IP` → peer address
//! - Resolution never fails; unresolvable clients share one `unknown` bucket
//!   so that accounting still applies to them

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Identifies the originating client. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientAddress(String);

impl ClientAddress {
    pub const UNKNOWN: &'static str = "unknown";

    /// Build an address from a raw value; blank input maps to `unknown`.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Self::unknown()
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientAddress {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Resolves [`ClientAddress`] for a request.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddressResolver {
    trust_proxy_headers: bool,
}

impl ClientAddressResolver {
    pub fn new(trust_proxy_headers: bool) -> Self {
        Self { trust_proxy_headers }
    }

    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientAddress {
        if self.trust_proxy_headers {
            if let Some(addr) = forwarded_for_head(headers).or_else(|| header_value(headers, X_REAL_IP)) {
                return ClientAddress::new(addr);
            }
        }

        match peer {
            Some(peer) => ClientAddress::new(peer.ip().to_canonical().to_string()),
            None => ClientAddress::unknown(),
        }
    }
}

fn forwarded_for_head(headers: &HeaderMap) -> Option<&str> {
    header_value(headers, X_FORWARDED_FOR)?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|head| !head.is_empty())
}

/// Lowercased media type of the `Content-Type` header, parameters dropped.
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:5555".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_head_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert(X_REAL_IP, HeaderValue::from_static("198.51.100.1"));

        let addr = ClientAddressResolver::new(true).resolve(&headers, peer());
        assert_eq!(addr.as_str(), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(" , 10.0.0.1"));
        headers.insert(X_REAL_IP, HeaderValue::from_static("198.51.100.1"));

        let addr = ClientAddressResolver::new(true).resolve(&headers, peer());
        assert_eq!(addr.as_str(), "198.51.100.1");
    }

    #[test]
    fn test_untrusted_headers_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.7"));

        let addr = ClientAddressResolver::new(false).resolve(&headers, peer());
        assert_eq!(addr.as_str(), "192.0.2.10");
    }

    #[test]
    fn test_mapped_ipv6_peer_is_canonical() {
        let peer: SocketAddr = "[::ffff:192.0.2.10]:80".parse().unwrap();
        let addr = ClientAddressResolver::new(true).resolve(&HeaderMap::new(), Some(peer));
        assert_eq!(addr.as_str(), "192.0.2.10");
    }

    #[test]
    fn test_media_type_drops_parameters() {
        let mut headers = HeaderMap::new();
        assert_eq!(media_type(&headers), None);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("Application/JSON; charset=utf-8"));
        assert_eq!(media_type(&headers).as_deref(), Some("application/json"));
    }

    #[test]
    fn test_unresolvable_is_unknown_bucket() {
        let addr = ClientAddressResolver::new(true).resolve(&HeaderMap::new(), None);
        assert!(addr.is_unknown());
        assert_eq!(ClientAddress::new("   "), ClientAddress::unknown());
    }
}
