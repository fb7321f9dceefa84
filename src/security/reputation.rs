//! Per-client suspicion counting and ban escalation.
//!
//! # State Machine
//! ```text
//! clean ──violation──▶ suspicious(count) ──count ≥ threshold──▶ banned(expires_at)
//!   ▲                        │                                       │
//!   └──── decay window ──────┘                                       │
//!   └──────────────────────────── ban expiry ────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Two sharded maps; every read-modify-write holds only the affected
//!   key's shard lock
//! - Lock order is always suspicions → bans, never the reverse
//! - Expired bans are removed lazily on lookup; the sweep reclaims the rest
//! - Sweeps remove one key at a time instead of retaining whole shards

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::ReputationConfig;
use crate::security::headers::ClientAddress;

pub const BAN_REASON: &str = "Multiple suspicious requests";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspicionRecord {
    pub count: u32,
    pub first_seen: Instant,
    pub last_seen: Instant,
}

impl SuspicionRecord {
    fn first(now: Instant) -> Self {
        Self {
            count: 1,
            first_seen: now,
            last_seen: now,
        }
    }

    fn is_decayed(&self, now: Instant, decay_window: Duration) -> bool {
        now.saturating_duration_since(self.first_seen) > decay_window
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub expires_at: Instant,
    pub reason: String,
}

impl BanRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Read-only view of a ban for the admin API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BanEntry {
    pub address: ClientAddress,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
}

/// Result of recording a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationOutcome {
    /// Counted; the client is not banned yet.
    Suspicious { count: u32 },
    /// This violation crossed the threshold and created the ban.
    Banned,
    /// A ban was already in force; nothing was counted.
    AlreadyBanned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub decayed_suspicions: usize,
    pub expired_bans: usize,
}

/// Owns all suspicion and ban state.
#[derive(Debug)]
pub struct ReputationStore {
    suspicions: DashMap<ClientAddress, SuspicionRecord>,
    bans: DashMap<ClientAddress, BanRecord>,
    ban_threshold: u32,
    ban_duration: Duration,
    decay_window: Duration,
}

impl ReputationStore {
    pub fn new(ban_threshold: u32, ban_duration: Duration, decay_window: Duration) -> Self {
        Self {
            suspicions: DashMap::new(),
            bans: DashMap::new(),
            ban_threshold: ban_threshold.max(1),
            ban_duration,
            decay_window,
        }
    }

    pub fn from_config(config: &ReputationConfig) -> Self {
        Self::new(config.ban_threshold, config.ban_duration(), config.decay_window())
    }

    /// True iff a non-expired ban exists. Expired bans are deleted here.
    pub fn is_banned(&self, addr: &ClientAddress) -> bool {
        let now = Instant::now();
        match self.bans.get(addr) {
            Some(ban) if !ban.is_expired(now) => true,
            Some(ban) => {
                drop(ban);
                if self.bans.remove_if(addr, |_, ban| ban.is_expired(now)).is_some() {
                    tracing::info!(client = %addr, "Ban expired");
                }
                false
            }
            None => false,
        }
    }

    /// Count a violation; promote to a ban when the threshold is reached.
    ///
    /// The whole transition runs under the client's suspicion entry lock, so
    /// concurrent violations from one client produce exactly one ban.
    pub fn record_violation(&self, addr: &ClientAddress) -> ViolationOutcome {
        let now = Instant::now();

        match self.suspicions.entry(addr.clone()) {
            Entry::Occupied(mut occupied) => {
                if self.ban_active(addr, now) {
                    occupied.remove();
                    return ViolationOutcome::AlreadyBanned;
                }

                let record = occupied.get_mut();
                if record.is_decayed(now, self.decay_window) {
                    *record = SuspicionRecord::first(now);
                } else {
                    record.count = record.count.saturating_add(1);
                    record.last_seen = now;
                }

                let count = record.count;
                if count >= self.ban_threshold {
                    self.promote(addr, now, count);
                    occupied.remove();
                    ViolationOutcome::Banned
                } else {
                    ViolationOutcome::Suspicious { count }
                }
            }
            Entry::Vacant(vacant) => {
                if self.ban_active(addr, now) {
                    return ViolationOutcome::AlreadyBanned;
                }
                if self.ban_threshold <= 1 {
                    self.promote(addr, now, 1);
                    return ViolationOutcome::Banned;
                }
                vacant.insert(SuspicionRecord::first(now));
                ViolationOutcome::Suspicious { count: 1 }
            }
        }
    }

    /// Current suspicion count (0 when clean, banned or decayed).
    pub fn suspicion_count(&self, addr: &ClientAddress) -> u32 {
        let now = Instant::now();
        self.suspicions
            .get(addr)
            .filter(|record| !record.is_decayed(now, self.decay_window))
            .map(|record| record.count)
            .unwrap_or(0)
    }

    pub fn suspicion(&self, addr: &ClientAddress) -> Option<SuspicionRecord> {
        self.suspicions.get(addr).map(|r| *r.value())
    }

    /// All bans still in force, soonest expiry first.
    pub fn active_bans(&self) -> Vec<BanEntry> {
        let now = Instant::now();
        let wall_now = Utc::now();

        let mut entries: Vec<BanEntry> = self
            .bans
            .iter()
            .filter(|ban| !ban.value().is_expired(now))
            .map(|ban| {
                let remaining = ban.value().expires_at.saturating_duration_since(now);
                let remaining = chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero());
                BanEntry {
                    address: ban.key().clone(),
                    expires_at: wall_now + remaining,
                    reason: ban.value().reason.clone(),
                }
            })
            .collect();

        entries.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        entries
    }

    pub fn suspicious_count(&self) -> usize {
        self.suspicions.len()
    }

    pub fn banned_count(&self) -> usize {
        self.bans.len()
    }

    /// Drop decayed suspicions and expired bans, one key at a time.
    pub fn sweep(&self) -> SweepStats {
        let now = Instant::now();
        let decay_window = self.decay_window;

        let decayed: Vec<ClientAddress> = self
            .suspicions
            .iter()
            .filter(|r| r.value().is_decayed(now, decay_window))
            .map(|r| r.key().clone())
            .collect();
        let decayed_suspicions = decayed
            .iter()
            .filter(|addr| {
                self.suspicions
                    .remove_if(*addr, |_, r| r.is_decayed(now, decay_window))
                    .is_some()
            })
            .count();

        let expired: Vec<ClientAddress> = self
            .bans
            .iter()
            .filter(|b| b.value().is_expired(now))
            .map(|b| b.key().clone())
            .collect();
        let expired_bans = expired
            .iter()
            .filter(|addr| self.bans.remove_if(*addr, |_, b| b.is_expired(now)).is_some())
            .count();

        SweepStats {
            decayed_suspicions,
            expired_bans,
        }
    }

    fn ban_active(&self, addr: &ClientAddress, now: Instant) -> bool {
        self.bans.get(addr).is_some_and(|ban| !ban.is_expired(now))
    }

    fn promote(&self, addr: &ClientAddress, now: Instant, count: u32) {
        self.bans.insert(
            addr.clone(),
            BanRecord {
                expires_at: now + self.ban_duration,
                reason: BAN_REASON.to_string(),
            },
        );
        tracing::warn!(
            client = %addr,
            violations = count,
            ban_secs = self.ban_duration.as_secs(),
            "Client banned for multiple suspicious requests"
        );
    }
}
