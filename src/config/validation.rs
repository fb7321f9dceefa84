//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds >= 1, windows > 0)
//! - Check that patterns compile and addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatekeeperConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{GatekeeperConfig, RateWindowConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &GatekeeperConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }
    check_addr(&mut errors, "upstream.address", &config.upstream.address);

    let reputation = &config.reputation;
    if reputation.ban_threshold == 0 {
        errors.push(ValidationError::new("reputation.ban_threshold", "must be at least 1"));
    }
    for (field, value) in [
        ("reputation.ban_duration_secs", reputation.ban_duration_secs),
        ("reputation.decay_window_secs", reputation.decay_window_secs),
        ("reputation.sweep_interval_secs", reputation.sweep_interval_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    check_window(&mut errors, "rate_limit.general", &config.rate_limit.general);
    check_window(&mut errors, "rate_limit.auth", &config.rate_limit.auth);
    check_window(&mut errors, "rate_limit.upload", &config.rate_limit.upload);

    let classifier = &config.classifier;
    check_prefix(&mut errors, "classifier.api_prefix", &classifier.api_prefix);
    for prefix in &classifier.asset_prefixes {
        check_prefix(&mut errors, "classifier.asset_prefixes", prefix);
    }
    for pattern in &classifier.allow_patterns {
        if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationError::new(
                "classifier.allow_patterns",
                format!("invalid pattern {pattern:?}: {e}"),
            ));
        }
    }
    if axum::http::StatusCode::from_u16(classifier.unrecognized_status).is_err() {
        errors.push(ValidationError::new(
            "classifier.unrecognized_status",
            format!("{} is not a valid status code", classifier.unrecognized_status),
        ));
    }

    for method in &config.api.allowed_methods {
        if axum::http::Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "api.allowed_methods",
                format!("invalid method {method:?}"),
            ));
        }
    }
    check_prefix(&mut errors, "uploads.prefix", &config.uploads.prefix);

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than zero"));
    }

    if config.access_log.enabled && config.access_log.queue_capacity == 0 {
        errors.push(ValidationError::new("access_log.queue_capacity", "must be at least 1"));
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }
    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("{value:?} is not a socket address")));
    }
}

fn check_prefix(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::new(field, format!("{value:?} must start with '/'")));
    }
}

fn check_window(errors: &mut Vec<ValidationError>, field: &str, window: &RateWindowConfig) {
    if window.window_secs == 0 {
        errors.push(ValidationError::new(
            format!("{field}.window_secs"),
            "must be greater than zero",
        ));
    }
    if window.max_requests == 0 {
        errors.push(ValidationError::new(
            format!("{field}.max_requests"),
            "must be at least 1",
        ));
    }
    for prefix in &window.path_prefixes {
        check_prefix(errors, &format!("{field}.path_prefixes"), prefix);
    }
}
