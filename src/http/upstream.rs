//! Forwarding of admitted requests to the protected application.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::uri::{Authority, InvalidUri, PathAndQuery, Scheme};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use axum::Router;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::config::UpstreamConfig;
use crate::security::headers::{ClientAddress, X_FORWARDED_FOR, X_REAL_IP};

/// Headers that describe one hop and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 5] = [
    header::CONNECTION,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

#[derive(Debug, Error)]
#[error("invalid upstream address {address}: {source}")]
pub struct UpstreamError {
    address: String,
    source: InvalidUri,
}

#[derive(Clone)]
pub struct UpstreamForwarder {
    client: Client<HttpConnector, Body>,
    authority: Authority,
    timeout: Duration,
}

impl UpstreamForwarder {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let authority = Authority::from_str(&config.address).map_err(|source| UpstreamError {
            address: config.address.clone(),
            source,
        })?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            authority,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Router that forwards every request it receives.
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(forward_handler)
            .with_state(self)
            .layer(TraceLayer::new_for_http())
    }

    pub async fn forward(&self, request: Request<Body>) -> Response {
        let (mut parts, body) = request.into_parts();

        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(self.authority.clone());
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        parts.uri = match Uri::from_parts(uri_parts) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build upstream uri");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };
        parts.version = Version::HTTP_11;

        let client = parts.extensions.get::<ClientAddress>().cloned();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_canonical().to_string());
        set_forwarding_headers(&mut parts.headers, client.as_ref(), peer.as_deref());

        let path = parts.uri.path().to_string();
        let request = Request::from_parts(parts, body);

        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let (parts, body) = response.into_parts();
                Response::from_parts(parts, Body::new(body))
            }
            Ok(Err(e)) => {
                tracing::error!(upstream = %self.authority, path = %path, error = %e, "Upstream error");
                StatusCode::BAD_GATEWAY.into_response()
            }
            Err(_) => {
                tracing::warn!(upstream = %self.authority, path = %path, timeout_secs = self.timeout.as_secs(), "Upstream timed out");
                StatusCode::GATEWAY_TIMEOUT.into_response()
            }
        }
    }
}

async fn forward_handler(State(upstream): State<UpstreamForwarder>, request: Request<Body>) -> Response {
    upstream.forward(request).await
}

/// Append the peer to `X-Forwarded-For` and set `X-Real-IP` to the resolved client.
fn set_forwarding_headers(headers: &mut HeaderMap, client: Option<&ClientAddress>, peer: Option<&str>) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }

    let hop = peer.or(client.map(ClientAddress::as_str));
    if let Some(hop) = hop {
        let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {hop}"),
            _ => hop.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Some(value) = client.and_then(|c| HeaderValue::from_str(c.as_str()).ok()) {
        headers.insert(X_REAL_IP, value);
    }
}
