//! Fixed-window rate limiting per (category, client).

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{RateLimitConfig, RateWindowConfig};
use crate::security::headers::ClientAddress;

/// Independent quota buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateCategory {
    General,
    Auth,
    Upload,
}

impl RateCategory {
    pub const ALL: [RateCategory; 3] = [RateCategory::General, RateCategory::Auth, RateCategory::Upload];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateCategory::General => "general",
            RateCategory::Auth => "auth",
            RateCategory::Upload => "upload",
        }
    }
}

/// A fixed window: starts at the first request, admits `max_requests`.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

/// Window length, ceiling, and which paths count against it.
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    pub window: Duration,
    pub max_requests: u32,
    pub path_prefixes: Vec<String>,
}

impl WindowPolicy {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            path_prefixes: Vec::new(),
        }
    }

    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    fn applies_to(&self, path: &str) -> bool {
        self.path_prefixes.is_empty() || self.path_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

impl From<&RateWindowConfig> for WindowPolicy {
    fn from(config: &RateWindowConfig) -> Self {
        WindowPolicy::new(Duration::from_secs(config.window_secs), config.max_requests)
            .with_prefixes(config.path_prefixes.iter().cloned())
    }
}

/// State for the per-category limiter.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<(RateCategory, ClientAddress), RateWindow>,
    policies: Vec<(RateCategory, WindowPolicy)>,
}

impl RateLimiter {
    pub fn new(policies: impl IntoIterator<Item = (RateCategory, WindowPolicy)>) -> Self {
        Self {
            windows: DashMap::new(),
            policies: policies.into_iter().collect(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::new([]);
        }
        Self::new([
            (RateCategory::General, WindowPolicy::from(&config.general)),
            (RateCategory::Auth, WindowPolicy::from(&config.auth)),
            (RateCategory::Upload, WindowPolicy::from(&config.upload)),
        ])
    }

    /// Categories whose quota a request to `path` consumes.
    pub fn categories_for(&self, path: &str) -> Vec<RateCategory> {
        self.policies
            .iter()
            .filter(|(_, policy)| policy.applies_to(path))
            .map(|(category, _)| *category)
            .collect()
    }

    /// Count one request against every category `path` falls under.
    ///
    /// All-or-nothing: when one quota is exhausted, counts already taken
    /// for the other categories are handed back and that category is returned.
    pub fn check(&self, path: &str, addr: &ClientAddress) -> Result<(), RateCategory> {
        let mut taken: Vec<(RateCategory, Instant)> = Vec::new();
        for category in self.categories_for(path) {
            match self.take(category, addr) {
                Some(window_start) => taken.push((category, window_start)),
                None => {
                    for (category, window_start) in taken {
                        self.refund(category, addr, window_start);
                    }
                    return Err(category);
                }
            }
        }
        Ok(())
    }

    /// Count one request; false once the window's ceiling is reached.
    pub fn allow(&self, category: RateCategory, addr: &ClientAddress) -> bool {
        self.policy(category).is_none() || self.take(category, addr).is_some()
    }

    /// Returns the start of the window the request was counted in.
    fn take(&self, category: RateCategory, addr: &ClientAddress) -> Option<Instant> {
        let policy = self.policy(category)?;
        let now = Instant::now();
        let mut window = self
            .windows
            .entry((category, addr.clone()))
            .or_insert(RateWindow {
                window_start: now,
                count: 0,
            });

        if now.saturating_duration_since(window.window_start) >= policy.window {
            window.window_start = now;
            window.count = 0;
        }

        if window.count >= policy.max_requests {
            None
        } else {
            window.count += 1;
            Some(window.window_start)
        }
    }

    /// Undo a `take`, unless the window has since rolled over.
    fn refund(&self, category: RateCategory, addr: &ClientAddress, window_start: Instant) {
        if let Some(mut window) = self.windows.get_mut(&(category, addr.clone())) {
            if window.window_start == window_start {
                window.count = window.count.saturating_sub(1);
            }
        }
    }

    /// Requests already counted in the client's current window.
    pub fn used(&self, category: RateCategory, addr: &ClientAddress) -> u32 {
        let Some(policy) = self.policy(category) else {
            return 0;
        };
        let now = Instant::now();
        self.windows
            .get(&(category, addr.clone()))
            .filter(|w| now.saturating_duration_since(w.window_start) < policy.window)
            .map(|w| w.count)
            .unwrap_or(0)
    }

    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows that have rolled over, one key at a time.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let stale: Vec<(RateCategory, ClientAddress)> = self
            .windows
            .iter()
            .filter(|w| self.is_stale(w.key().0, w.value(), now))
            .map(|w| w.key().clone())
            .collect();

        stale
            .iter()
            .filter(|key| {
                self.windows
                    .remove_if(*key, |(category, _), w| self.is_stale(*category, w, now))
                    .is_some()
            })
            .count()
    }

    fn policy(&self, category: RateCategory) -> Option<&WindowPolicy> {
        self.policies
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, policy)| policy)
    }

    fn is_stale(&self, category: RateCategory, window: &RateWindow, now: Instant) -> bool {
        self.policy(category)
            .map_or(true, |policy| now.saturating_duration_since(window.window_start) >= policy.window)
    }
}
