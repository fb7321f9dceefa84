//! Periodic reclamation of per-client state.
//!
//! # Responsibilities
//! - Remove decayed suspicion records and expired bans
//! - Remove rolled-over rate windows
//! - Refresh the tracked-client gauges
//!
//! # Design Decisions
//! - Owned task with a `JoinHandle`; stops on the shutdown broadcast
//! - The first sweep runs one interval after start, not immediately

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::observability::metrics;
use crate::security::rate_limit::RateLimiter;
use crate::security::reputation::ReputationStore;

pub struct Sweeper {
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub fn spawn(
        reputation: Arc<ReputationStore>,
        rate_limiter: Arc<RateLimiter>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Reputation sweeper starting");

            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep_once(&reputation, &rate_limiter);
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Reputation sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });

        Self { handle }
    }

    /// Wait for the task to exit after shutdown was triggered.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Reputation sweeper task failed");
        }
    }
}

pub fn sweep_once(reputation: &ReputationStore, rate_limiter: &RateLimiter) {
    let stats = reputation.sweep();
    let windows = rate_limiter.sweep();

    tracing::debug!(
        decayed_suspicions = stats.decayed_suspicions,
        expired_bans = stats.expired_bans,
        stale_windows = windows,
        "Sweep complete"
    );

    metrics::record_tracked_clients(
        reputation.banned_count(),
        reputation.suspicious_count(),
        rate_limiter.tracked_windows(),
    );
}
