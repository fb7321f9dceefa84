//! Read-only administrative API: status, active bans and the security log.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::security::{RateLimiter, ReputationStore};

#[derive(Clone)]
pub struct AdminState {
    pub reputation: Arc<ReputationStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub access_log_path: Option<PathBuf>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/bans", get(get_bans))
        .route("/admin/security-logs", get(get_security_logs))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
