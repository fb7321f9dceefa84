//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gatekeeper.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gatekeeper.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Public listener (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Application that admitted requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Client address resolution.
    pub client_address: ClientAddressConfig,

    /// Suspicion counting and ban escalation.
    pub reputation: ReputationConfig,

    /// Per-category fixed-window quotas.
    pub rate_limit: RateLimitConfig,

    /// Path allow/deny rules.
    pub classifier: ClassifierConfig,

    /// Method, content-type and origin policy for the API surface.
    pub api: ApiConfig,

    /// Checks on uploaded asset paths.
    pub uploads: UploadConfig,

    /// Body handling limits.
    pub security: SecurityConfig,

    /// Audit trail sink.
    pub access_log: AccessLogConfig,

    /// Administrative read API.
    pub admin: AdminConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// How long to wait for in-flight connections on shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            drain_timeout_secs: 10,
        }
    }
}

/// Upstream application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:10000").
    pub address: String,

    /// Timeout for a forwarded request in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:10000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Which headers are trusted when resolving the client address.
///
/// Precedence when trusted: `X-Forwarded-For` (first entry), then `X-Real-IP`,
/// then the peer socket address.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientAddressConfig {
    /// Trust proxy-supplied headers. Disable when not behind a proxy.
    pub trust_proxy_headers: bool,
}

impl Default for ClientAddressConfig {
    fn default() -> Self {
        Self {
            trust_proxy_headers: true,
        }
    }
}

/// Reputation escalation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Violations within the decay window that trigger a ban.
    pub ban_threshold: u32,

    /// Ban length in seconds.
    pub ban_duration_secs: u64,

    /// Age in seconds after which an unrepeated suspicion is forgotten.
    pub decay_window_secs: u64,

    /// Interval of the background sweep in seconds.
    pub sweep_interval_secs: u64,
}

impl ReputationConfig {
    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs)
    }

    pub fn decay_window(&self) -> Duration {
        Duration::from_secs(self.decay_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            ban_threshold: 3,
            ban_duration_secs: 7 * 24 * 60 * 60,
            decay_window_secs: 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

/// What happens to a request over quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExceededPolicy {
    /// Drop the connection without a response.
    #[default]
    Terminate,
    /// Answer 429 with no body and no `Retry-After`.
    Reject,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Response policy when a quota is exhausted.
    pub on_exceeded: ExceededPolicy,

    /// Applies to every admitted path.
    pub general: RateWindowConfig,

    /// Authentication endpoints.
    pub auth: RateWindowConfig,

    /// Upload endpoints.
    pub upload: RateWindowConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_exceeded: ExceededPolicy::Terminate,
            general: RateWindowConfig {
                window_secs: 15 * 60,
                max_requests: 1000,
                path_prefixes: Vec::new(),
            },
            auth: RateWindowConfig {
                window_secs: 60 * 60,
                max_requests: 20,
                path_prefixes: vec!["/api/auth".to_string()],
            },
            upload: RateWindowConfig {
                window_secs: 60 * 60,
                max_requests: 100,
                path_prefixes: vec!["/api/chat/upload".to_string()],
            },
        }
    }
}

/// A single fixed-window quota.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateWindowConfig {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Requests admitted per window.
    pub max_requests: u32,

    /// Path prefixes counted against this quota. Empty means every path.
    #[serde(default)]
    pub path_prefixes: Vec<String>,
}

/// Path classification rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Prefix of the API surface.
    pub api_prefix: String,

    /// Static asset prefixes.
    pub asset_prefixes: Vec<String>,

    /// Exact page paths.
    pub pages: Vec<String>,

    /// Additional allowed path patterns (regular expressions).
    pub allow_patterns: Vec<String>,

    /// Allow `/{token}` and `/{password}/{token}` room links.
    pub room_links: bool,

    /// Case-insensitive substrings and suffixes of known probe paths.
    pub denylist: Vec<String>,

    /// File names denied under any prefix.
    pub blocked_files: Vec<String>,

    /// Paths that are always dropped and never forwarded.
    pub decoy_paths: Vec<String>,

    /// Status returned for paths no rule recognizes.
    pub unrecognized_status: u16,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api/".to_string(),
            asset_prefixes: to_strings(&["/css/", "/js/", "/images/", "/uploads/", "/socket.io/"]),
            pages: to_strings(&["/", "/favicon.ico", "/loading.html", "/1101admin"]),
            allow_patterns: Vec::new(),
            room_links: true,
            denylist: to_strings(DEFAULT_DENYLIST),
            blocked_files: to_strings(&[
                ".htaccess",
                ".git",
                "web.config",
                "robots.txt",
                "sitemap.xml",
            ]),
            decoy_paths: to_strings(&["/api/resource-token"]),
            unrecognized_status: 404,
        }
    }
}

/// Probe paths seen from scanners: CMS admin areas, database consoles,
/// script and backup extensions, system files.
const DEFAULT_DENYLIST: &[&str] = &[
    "/wp-admin",
    "/wp-login",
    "/wp-content",
    "/wp-includes",
    "/xmlrpc.php",
    "/wp-config",
    "/setup-config.php",
    "/phpmyadmin",
    "/pma",
    "/myadmin",
    "/mysql",
    "/shell",
    "/admin.php",
    "/sql",
    "/database",
    "/db",
    "/jenkins",
    "/solr",
    "/.env",
    "/config",
    "/install",
    "/setup",
    "/admin",
    "/login",
    "/temp",
    "/tmp",
    "/.git",
    "/.svn",
    "/actuator",
    "/api-docs",
    "/swagger",
    ".php",
    ".asp",
    ".aspx",
    ".jsp",
    ".jspx",
    ".config",
    ".conf",
    ".cfg",
    ".ini",
    ".sql",
    ".db",
    ".sqlite",
    ".log",
    ".bak",
    ".backup",
    ".old",
    ".temp",
    "~",
    "/etc/passwd",
    "/windows/win.ini",
    "/laravel",
    "/symfony",
    "/drupal",
    "/joomla",
    "/magento",
    "/shopify",
    "/prestashop",
    "/opencart",
    "/moodle",
];

/// API surface policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Methods accepted under the API prefix.
    pub allowed_methods: Vec<String>,

    /// Origins accepted in addition to the serving host.
    pub allowed_origins: Vec<String>,

    /// Endpoints that take file uploads instead of JSON.
    pub upload_paths: Vec<String>,

    /// Content types accepted on upload endpoints.
    pub upload_content_types: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            allowed_methods: to_strings(&["GET", "POST", "DELETE", "OPTIONS"]),
            allowed_origins: Vec::new(),
            upload_paths: to_strings(&["/api/chat/upload"]),
            upload_content_types: to_strings(&["multipart/form-data", "application/octet-stream"]),
        }
    }
}

/// Uploaded asset access policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Prefix under which uploaded files are served.
    pub prefix: String,

    /// File extensions that may be served (with leading dot).
    pub allowed_extensions: Vec<String>,

    /// Require a referer from a chat or admin page.
    pub require_referer: bool,

    /// Substrings one of which the referer must contain.
    pub referer_markers: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            prefix: "/uploads/".to_string(),
            allowed_extensions: to_strings(&[".jpg", ".jpeg", ".png", ".gif", ".svg"]),
            require_referer: false,
            referer_markers: to_strings(&["/chat", "/admin"]),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes buffered for sanitization.
    pub max_body_size: usize,
    /// Strip angle brackets from JSON and form bodies.
    pub sanitize_body: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
            sanitize_body: true,
        }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Write the audit trail.
    pub enabled: bool,

    /// File the JSON lines are appended to.
    pub path: String,

    /// Records buffered for the writer; overflow is dropped and counted.
    pub queue_capacity: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "logs/access.log".to_string(),
            queue_capacity: 10_000,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let config = GatekeeperConfig::default();
        assert_eq!(config.reputation.ban_threshold, 3);
        assert_eq!(config.reputation.ban_duration(), Duration::from_secs(604_800));
        assert_eq!(config.reputation.decay_window(), Duration::from_secs(3600));
        assert_eq!(config.rate_limit.auth.max_requests, 20);
        assert_eq!(config.rate_limit.on_exceeded, ExceededPolicy::Terminate);
        assert!(config.classifier.denylist.iter().any(|d| d == "/wp-admin"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GatekeeperConfig = toml::from_str(
            r#"
            [reputation]
            ban_threshold = 5

            [rate_limit]
            on_exceeded = "reject"

            [rate_limit.auth]
            window_secs = 60
            max_requests = 2
            path_prefixes = ["/api/auth"]
            "#,
        )
        .unwrap();

        assert_eq!(config.reputation.ban_threshold, 5);
        assert_eq!(config.reputation.decay_window_secs, 3600);
        assert_eq!(config.rate_limit.on_exceeded, ExceededPolicy::Reject);
        assert_eq!(config.rate_limit.auth.max_requests, 2);
        assert_eq!(config.rate_limit.general.max_requests, 1000);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }
}
