use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::observability::access_log::{read_recent, AccessRecord, LogFilter};
use crate::security::BanEntry;

const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub suspicious_clients: usize,
    pub banned_clients: usize,
    pub rate_windows: usize,
}

#[derive(Debug, Deserialize)]
pub struct SecurityLogQuery {
    #[serde(rename = "type", default)]
    pub filter: LogFilter,
    pub limit: Option<usize>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        suspicious_clients: state.reputation.suspicious_count(),
        banned_clients: state.reputation.banned_count(),
        rate_windows: state.rate_limiter.tracked_windows(),
    })
}

pub async fn get_bans(State(state): State<AdminState>) -> Json<Vec<BanEntry>> {
    Json(state.reputation.active_bans())
}

pub async fn get_security_logs(
    State(state): State<AdminState>,
    Query(query): Query<SecurityLogQuery>,
) -> Result<Json<Vec<AccessRecord>>, StatusCode> {
    let Some(path) = state.access_log_path.as_deref() else {
        return Ok(Json(Vec::new()));
    };
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);

    read_recent(path, query.filter, limit)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to read access log");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
