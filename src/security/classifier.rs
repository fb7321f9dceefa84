//! Path classification against allow and deny rules.
//!
//! # Responsibilities
//! - Normalize the request path (collapse repeated separators)
//! - Deny traversal, directory listings and sensitive file names outright
//! - Match allow rules (pages, assets, API prefix, room links, patterns)
//! - Match the probe denylist for everything else
//!
//! # Design Decisions
//! - Traversal is checked before any allow rule, so no allow rule can admit it
//! - Denylist matching is case-insensitive substring matching
//! - Rules are compiled once at startup and immutable afterwards

use axum::http::Method;
use regex::RegexSet;
use std::collections::HashSet;

use crate::config::ClassifierConfig;

/// Which allow rule admitted a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Page,
    Asset,
    RoomLink,
    Pattern,
    Api,
}

/// Why a path was denylisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Traversal,
    DirectoryListing,
    BlockedFile,
    ProbePath,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Traversal => "traversal",
            DenyReason::DirectoryListing => "directory_listing",
            DenyReason::BlockedFile => "blocked_file",
            DenyReason::ProbePath => "probe_path",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Allowed(Surface),
    Denylisted(DenyReason),
    Unrecognized,
}

/// Trait for allow rules evaluated against a normalized path.
pub trait PathRule: Send + Sync + std::fmt::Debug {
    /// Returns true if the path matches this rule.
    fn matches(&self, path: &str) -> bool;
}

/// Matches a path prefix (case-sensitive).
#[derive(Debug, Clone)]
pub struct PrefixRule {
    prefix: String,
}

impl PrefixRule {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl PathRule for PrefixRule {
    fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}

/// Matches one of a fixed set of paths exactly.
#[derive(Debug, Clone, Default)]
pub struct ExactRule {
    paths: HashSet<String>,
}

impl ExactRule {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl PathRule for ExactRule {
    fn matches(&self, path: &str) -> bool {
        self.paths.contains(path)
    }
}

/// Matches any of a set of regular expressions.
#[derive(Debug, Clone)]
pub struct PatternRule {
    set: RegexSet,
}

impl PatternRule {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            set: RegexSet::new(patterns)?,
        })
    }
}

impl PathRule for PatternRule {
    fn matches(&self, path: &str) -> bool {
        self.set.is_match(path)
    }
}

/// Matches `/{token}` and `/{password}/{token}` where token is 3-7
/// ASCII alphanumerics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomLinkRule;

impl RoomLinkRule {
    fn is_token(segment: &str) -> bool {
        (3..=7).contains(&segment.len()) && segment.bytes().all(|b| b.is_ascii_alphanumeric())
    }
}

impl PathRule for RoomLinkRule {
    fn matches(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [token] | [_, token] => Self::is_token(token),
            _ => false,
        }
    }
}

/// Collapse runs of `/` into one.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !previous_slash {
                normalized.push(c);
            }
            previous_slash = true;
        } else {
            normalized.push(c);
            previous_slash = false;
        }
    }
    normalized
}

/// True if any segment (split on either separator, with percent-encoded
/// dots and separators decoded) is a parent-directory reference.
pub fn contains_traversal(path: &str) -> bool {
    let decoded = path
        .to_ascii_lowercase()
        .replace("%2e", ".")
        .replace("%2f", "/")
        .replace("%5c", "\\");
    decoded.split(['/', '\\']).any(|segment| segment == "..")
}

/// Categorizes request paths. Built once from [`ClassifierConfig`].
#[derive(Debug)]
pub struct PathClassifier {
    api: PrefixRule,
    api_prefix: String,
    pages: ExactRule,
    assets: Vec<PrefixRule>,
    patterns: Option<PatternRule>,
    room_links: Option<RoomLinkRule>,
    denylist: Vec<String>,
    blocked_files: Vec<String>,
    decoys: ExactRule,
}

impl PathClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, regex::Error> {
        let patterns = if config.allow_patterns.is_empty() {
            None
        } else {
            Some(PatternRule::new(&config.allow_patterns)?)
        };

        Ok(Self {
            api: PrefixRule::new(config.api_prefix.clone()),
            api_prefix: config.api_prefix.clone(),
            pages: ExactRule::new(config.pages.iter().cloned()),
            assets: config.asset_prefixes.iter().map(PrefixRule::new).collect(),
            patterns,
            room_links: config.room_links.then_some(RoomLinkRule),
            denylist: lowercase_all(&config.denylist),
            blocked_files: lowercase_all(&config.blocked_files),
            decoys: ExactRule::new(config.decoy_paths.iter().cloned()),
        })
    }

    pub fn classify(&self, path: &str, method: &Method) -> Classification {
        let normalized = normalize_path(path);
        if contains_traversal(&normalized) {
            return Classification::Denylisted(DenyReason::Traversal);
        }

        if normalized.len() > 1 && normalized.ends_with('/') && !normalized.starts_with(&self.api_prefix) {
            return Classification::Denylisted(DenyReason::DirectoryListing);
        }

        let lowered = normalized.to_ascii_lowercase();
        if self.blocked_files.iter().any(|f| lowered.contains(f.as_str())) {
            return Classification::Denylisted(DenyReason::BlockedFile);
        }

        if let Some(surface) = self.allowed_surface(&normalized, method) {
            return Classification::Allowed(surface);
        }

        if self.denylist.iter().any(|d| lowered.contains(d.as_str())) {
            return Classification::Denylisted(DenyReason::ProbePath);
        }

        Classification::Unrecognized
    }

    /// Paths that are always dropped even though they sit on an allowed surface.
    pub fn is_decoy(&self, path: &str) -> bool {
        self.decoys.matches(&normalize_path(path))
    }

    pub fn is_api(&self, path: &str) -> bool {
        self.api.matches(path)
    }

    fn allowed_surface(&self, path: &str, method: &Method) -> Option<Surface> {
        // The API surface polices its own methods later in the pipeline.
        if self.api.matches(path) {
            return Some(Surface::Api);
        }
        if method != Method::GET && method != Method::HEAD {
            return None;
        }

        if self.pages.matches(path) {
            Some(Surface::Page)
        } else if self.assets.iter().any(|rule| rule.matches(path)) {
            Some(Surface::Asset)
        } else if self.patterns.as_ref().is_some_and(|rule| rule.matches(path)) {
            Some(Surface::Pattern)
        } else if self.room_links.as_ref().is_some_and(|rule| rule.matches(path)) {
            Some(Surface::RoomLink)
        } else {
            None
        }
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_ascii_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> PathClassifier {
        PathClassifier::from_config(&ClassifierConfig::default()).unwrap()
    }

    #[test]
    fn test_normalize_collapses_separators() {
        assert_eq!(normalize_path("//images///a.png"), "/images/a.png");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_traversal_beats_allow_rules() {
        let c = classifier();
        for path in [
            "/images/../../etc/passwd",
            "/api/chat/..",
            "/css/..\\secret",
            "/js/%2e%2e/%2E%2E/x",
        ] {
            assert_eq!(
                c.classify(path, &Method::GET),
                Classification::Denylisted(DenyReason::Traversal),
                "{path}"
            );
        }
        assert!(!contains_traversal("/images/a..b.png"));
    }

    #[test]
    fn test_allowed_surfaces() {
        let c = classifier();
        assert_eq!(c.classify("/", &Method::GET), Classification::Allowed(Surface::Page));
        assert_eq!(c.classify("/favicon.ico", &Method::GET), Classification::Allowed(Surface::Page));
        assert_eq!(c.classify("/images/foo.png", &Method::GET), Classification::Allowed(Surface::Asset));
        assert_eq!(c.classify("//css//site.css", &Method::HEAD), Classification::Allowed(Surface::Asset));
        assert_eq!(c.classify("/api/auth/login", &Method::POST), Classification::Allowed(Surface::Api));
        assert_eq!(c.classify("/Ab3dE", &Method::GET), Classification::Allowed(Surface::RoomLink));
        assert_eq!(c.classify("/s3cret/room12", &Method::GET), Classification::Allowed(Surface::RoomLink));
    }

    #[test]
    fn test_probe_paths_denylisted() {
        let c = classifier();
        for path in ["/wp-admin", "/WP-Login.php", "/phpmyadmin/setup.php", "/backup.sql", "/index.php", "/a/b/c~"] {
            assert_eq!(
                c.classify(path, &Method::GET),
                Classification::Denylisted(DenyReason::ProbePath),
                "{path}"
            );
        }
    }

    #[test]
    fn test_sensitive_files_denied_under_any_prefix() {
        let c = classifier();
        assert_eq!(
            c.classify("/images/robots.txt", &Method::GET),
            Classification::Denylisted(DenyReason::BlockedFile)
        );
        assert_eq!(
            c.classify("/api/.git/config", &Method::GET),
            Classification::Denylisted(DenyReason::BlockedFile)
        );
        assert_eq!(
            c.classify("/.htaccess", &Method::GET),
            Classification::Denylisted(DenyReason::BlockedFile)
        );
    }

    #[test]
    fn test_directory_listing() {
        let c = classifier();
        assert_eq!(
            c.classify("/images/", &Method::GET),
            Classification::Denylisted(DenyReason::DirectoryListing)
        );
        assert_eq!(c.classify("/api/chat/", &Method::GET), Classification::Allowed(Surface::Api));
    }

    #[test]
    fn test_unrecognized_is_not_denylisted() {
        let c = classifier();
        assert_eq!(c.classify("/some/deep/unknown/path", &Method::GET), Classification::Unrecognized);
        assert_eq!(c.classify("/toolongtoken", &Method::GET), Classification::Unrecognized);
        // Pages are GET surfaces only.
        assert_eq!(c.classify("/favicon.ico", &Method::POST), Classification::Unrecognized);
    }

    #[test]
    fn test_extra_patterns() {
        let config = ClassifierConfig {
            allow_patterns: vec![r"^/help/user\d{5}$".to_string()],
            ..ClassifierConfig::default()
        };
        let c = PathClassifier::from_config(&config).unwrap();
        assert_eq!(c.classify("/help/user12345", &Method::GET), Classification::Allowed(Surface::Pattern));
    }

    #[test]
    fn test_decoy() {
        let c = classifier();
        assert!(c.is_decoy("/api/resource-token"));
        assert!(c.is_decoy("//api//resource-token"));
        assert!(!c.is_decoy("/api/chat/rooms"));
    }
}
