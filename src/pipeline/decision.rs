//! Admission outcomes.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::fmt;
use thiserror::Error;

use crate::security::{DenyReason, RateCategory, SurfaceViolation};

/// Why a connection was dropped without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    Banned,
    Denylisted(DenyReason),
    Surface(SurfaceViolation),
    RateLimited(RateCategory),
    Decoy,
    Sanitization,
    Internal,
}

impl TerminateReason {
    /// Stable label used in logs, metrics and the access log.
    pub fn label(&self) -> String {
        match self {
            TerminateReason::Banned => "banned".to_string(),
            TerminateReason::Denylisted(reason) => format!("denylisted:{}", reason.as_str()),
            TerminateReason::Surface(violation) => format!("surface:{}", violation.as_str()),
            TerminateReason::RateLimited(category) => format!("rate_limited:{}", category.as_str()),
            TerminateReason::Decoy => "decoy".to_string(),
            TerminateReason::Sanitization => "sanitization".to_string(),
            TerminateReason::Internal => "internal".to_string(),
        }
    }

    /// Reasons that count toward a ban.
    pub fn is_violation(&self) -> bool {
        matches!(self, TerminateReason::Denylisted(_))
    }
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Result of running one request through the pipeline.
#[derive(Debug)]
pub enum Decision {
    /// Forward the (sanitized) request downstream.
    Admit(Request<Body>),
    /// Answer with a bare status and no body.
    Reject(StatusCode),
    /// Close the connection without writing anything.
    Terminate(TerminateReason),
}

impl Decision {
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Admit(_) => "admitted",
            Decision::Reject(_) => "rejected",
            Decision::Terminate(_) => "terminated",
        }
    }

    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit(_))
    }

    pub fn terminate_reason(&self) -> Option<TerminateReason> {
        match self {
            Decision::Terminate(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Error yielded by a gatekept service; the transport closes the
/// connection without a response when it sees it.
#[derive(Debug, Clone, Copy, Error)]
#[error("connection terminated: {reason}")]
pub struct Terminated {
    pub reason: TerminateReason,
}
