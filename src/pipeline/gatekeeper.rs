//! The ordered admission pipeline.
//!
//! # Stages
//! ```text
//! resolve client address, collapse repeated `/` in the path
//!     → ban check                      banned        → terminate
//!     → classify path                  denylisted    → record violation, terminate
//!                                      unrecognized  → reject (bare status)
//!     → surface checks                 violation     → terminate
//!     → rate limit (each category)     exceeded      → terminate | reject 429
//!     → decoy paths                                  → terminate
//!     → sanitize query and body        failure       → terminate
//!     → admit
//! ```
//!
//! # Design Decisions
//! - Stages short-circuit; later stages never see a request an earlier one stopped
//! - Every stage, the access log and the upstream see the same normalized path
//! - Only reasons with [`TerminateReason::is_violation`] escalate reputation
//! - Every decision is logged, counted and appended to the access log

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::status::InvalidStatusCode;
use axum::http::{Method, Request, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ExceededPolicy, GatekeeperConfig};
use crate::observability::access_log::{AccessRecord, AccessSink, Outcome};
use crate::observability::metrics;
use crate::pipeline::decision::{Decision, TerminateReason};
use crate::security::classifier::normalize_path;
use crate::security::reputation::BAN_REASON;
use crate::security::sanitize::with_path;
use crate::security::{
    Classification, ClientAddress, ClientAddressResolver, PathClassifier, RateLimiter, ReputationStore,
    Sanitizer, SurfaceGuard, ViolationOutcome,
};

#[derive(Debug, Error)]
pub enum GatekeeperError {
    #[error("invalid allow pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid unrecognized_status: {0}")]
    Status(#[from] InvalidStatusCode),
}

/// Composes the security stores into one admission decision per request.
pub struct Gatekeeper {
    resolver: ClientAddressResolver,
    reputation: Arc<ReputationStore>,
    classifier: PathClassifier,
    surface: SurfaceGuard,
    rate_limiter: Arc<RateLimiter>,
    on_exceeded: ExceededPolicy,
    sanitizer: Sanitizer,
    unrecognized_status: StatusCode,
    access_log: Arc<dyn AccessSink>,
}

impl Gatekeeper {
    pub fn from_config(config: &GatekeeperConfig, access_log: Arc<dyn AccessSink>) -> Result<Self, GatekeeperError> {
        Ok(Self {
            resolver: ClientAddressResolver::new(config.client_address.trust_proxy_headers),
            reputation: Arc::new(ReputationStore::from_config(&config.reputation)),
            classifier: PathClassifier::from_config(&config.classifier)?,
            surface: SurfaceGuard::from_config(&config.api, &config.uploads, &config.classifier.api_prefix),
            rate_limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            on_exceeded: config.rate_limit.on_exceeded,
            sanitizer: Sanitizer::from_config(&config.security),
            unrecognized_status: StatusCode::from_u16(config.classifier.unrecognized_status)?,
            access_log,
        })
    }

    pub fn reputation(&self) -> &Arc<ReputationStore> {
        &self.reputation
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Run one request through every stage.
    ///
    /// The peer address is read from the `ConnectInfo<SocketAddr>` extension.
    /// Admitted requests carry the resolved [`ClientAddress`] as an extension.
    pub async fn evaluate(&self, request: Request<Body>) -> Decision {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client = self.resolver.resolve(request.headers(), peer);
        let method = request.method().clone();
        let path = normalize_path(request.uri().path());

        let decision = self.decide(request, &client, &method, &path).await;
        if decision.terminate_reason().is_some_and(|reason| reason.is_violation()) {
            self.escalate(&client, &method, &path);
        }
        self.record(&client, &method, &path, &decision);
        decision
    }

    async fn decide(&self, mut request: Request<Body>, client: &ClientAddress, method: &Method, path: &str) -> Decision {
        if self.reputation.is_banned(client) {
            return Decision::Terminate(TerminateReason::Banned);
        }

        match self.classifier.classify(path, method) {
            Classification::Allowed(_) => {}
            Classification::Denylisted(reason) => return Decision::Terminate(TerminateReason::Denylisted(reason)),
            Classification::Unrecognized => return Decision::Reject(self.unrecognized_status),
        }

        if let Err(violation) = self.surface.check(method, path, request.headers()) {
            return Decision::Terminate(TerminateReason::Surface(violation));
        }

        if let Err(category) = self.rate_limiter.check(path, client) {
            return match self.on_exceeded {
                ExceededPolicy::Terminate => Decision::Terminate(TerminateReason::RateLimited(category)),
                ExceededPolicy::Reject => Decision::Reject(StatusCode::TOO_MANY_REQUESTS),
            };
        }

        if self.classifier.is_decoy(path) {
            return Decision::Terminate(TerminateReason::Decoy);
        }

        if request.uri().path() != path {
            match with_path(request.uri(), path) {
                Ok(uri) => *request.uri_mut() = uri,
                Err(e) => {
                    tracing::warn!(client = %client, path = %path, error = %e, "Path rewrite failed");
                    return Decision::Terminate(TerminateReason::Sanitization);
                }
            }
        }

        request.extensions_mut().insert(client.clone());
        match self.sanitizer.sanitize(request).await {
            Ok(request) => Decision::Admit(request),
            Err(e) => {
                tracing::warn!(client = %client, method = %method, path = %path, error = %e, "Sanitization failed");
                Decision::Terminate(TerminateReason::Sanitization)
            }
        }
    }

    fn escalate(&self, client: &ClientAddress, method: &Method, path: &str) {
        match self.reputation.record_violation(client) {
            ViolationOutcome::Suspicious { count } => {
                tracing::debug!(client = %client, count, "Suspicious request recorded");
            }
            ViolationOutcome::Banned => {
                metrics::record_ban();
                self.access_log.append(AccessRecord::now(
                    method.as_str(),
                    path,
                    client.clone(),
                    Outcome::Banned {
                        reason: BAN_REASON.to_string(),
                    },
                ));
            }
            ViolationOutcome::AlreadyBanned => {}
        }
    }

    fn record(&self, client: &ClientAddress, method: &Method, path: &str, decision: &Decision) {
        let (outcome, reason) = match decision {
            Decision::Admit(_) => {
                tracing::debug!(client = %client, method = %method, path = %path, "Request admitted");
                (Outcome::Admitted, String::new())
            }
            Decision::Reject(status) => {
                tracing::debug!(client = %client, method = %method, path = %path, status = status.as_u16(), "Request rejected");
                (
                    Outcome::Rejected {
                        status: status.as_u16(),
                    },
                    status.as_u16().to_string(),
                )
            }
            Decision::Terminate(reason) => {
                let label = reason.label();
                tracing::info!(client = %client, method = %method, path = %path, reason = %label, "Connection terminated");
                (Outcome::Terminated { reason: label.clone() }, label)
            }
        };

        metrics::record_decision(decision.outcome(), reason);
        self.access_log
            .append(AccessRecord::now(method.as_str(), path, client.clone(), outcome));
    }
}
