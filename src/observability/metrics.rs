//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gatekeeper_decisions_total` (counter): admission outcomes by `outcome`, `reason`
//! - `gatekeeper_bans_total` (counter): ban transitions
//! - `gatekeeper_banned_clients` (gauge): bans currently in force
//! - `gatekeeper_suspicious_clients` (gauge): clients with open suspicion records
//! - `gatekeeper_rate_windows` (gauge): tracked rate-limit windows
//! - `gatekeeper_access_log_dropped_total` (counter): records lost to a full writer queue
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Gauges are refreshed by the sweeper rather than on every request

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("gatekeeper_decisions_total", "Admission decisions by outcome and reason");
    describe_counter!("gatekeeper_bans_total", "Clients banned after repeated violations");
    describe_gauge!("gatekeeper_banned_clients", "Bans currently in force");
    describe_gauge!("gatekeeper_suspicious_clients", "Clients with an open suspicion record");
    describe_gauge!("gatekeeper_rate_windows", "Tracked rate-limit windows");
    describe_counter!(
        "gatekeeper_access_log_dropped_total",
        "Access records dropped because the writer queue was full"
    );

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_decision(outcome: &'static str, reason: String) {
    counter!("gatekeeper_decisions_total", "outcome" => outcome, "reason" => reason).increment(1);
}

pub fn record_ban() {
    counter!("gatekeeper_bans_total").increment(1);
}

pub fn record_tracked_clients(banned: usize, suspicious: usize, rate_windows: usize) {
    gauge!("gatekeeper_banned_clients").set(banned as f64);
    gauge!("gatekeeper_suspicious_clients").set(suspicious as f64);
    gauge!("gatekeeper_rate_windows").set(rate_windows as f64);
}

pub fn record_access_log_dropped() {
    counter!("gatekeeper_access_log_dropped_total").increment(1);
}
