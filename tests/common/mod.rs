//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use axum::{Json, Router};
use gatekeeper::{GatekeeperConfig, Gateway, Shutdown};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const ADMIN_KEY: &str = "test-admin-key";

/// Start an upstream that echoes what it received as JSON.
pub async fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(echo);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

async fn echo(request: Request<Body>) -> Json<Value> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Json(json!({
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "x_real_ip": header("x-real-ip"),
        "x_forwarded_for": header("x-forwarded-for"),
        "body": String::from_utf8_lossy(&bytes),
    }))
}

/// A running gatekeeper in front of an echo upstream.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub admin_addr: Option<SocketAddr>,
    pub upstream_addr: SocketAddr,
    pub shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
    _log_dir: TempDir,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        let addr = self.admin_addr.expect("admin API not enabled");
        format!("http://{}{}", addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("gateway did not stop in time")
            .expect("gateway task panicked");
        result.expect("gateway returned an error");
    }
}

/// Base configuration for tests: ephemeral ports, access log in a temp dir.
pub fn test_config(upstream: SocketAddr, log_dir: &TempDir) -> GatekeeperConfig {
    let mut config = GatekeeperConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.drain_timeout_secs = 1;
    config.upstream.address = upstream.to_string();
    config.upstream.timeout_secs = 5;
    config.access_log.path = log_dir
        .path()
        .join("access.log")
        .to_string_lossy()
        .into_owned();
    config.admin.enabled = true;
    config.admin.bind_address = "127.0.0.1:0".to_string();
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

/// Start a gatekeeper with the test defaults adjusted by `tweak`.
pub async fn start_gatekeeper(tweak: impl FnOnce(&mut GatekeeperConfig)) -> TestGateway {
    let upstream_addr = start_echo_upstream().await;
    let log_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(upstream_addr, &log_dir);
    tweak(&mut config);

    let shutdown = Shutdown::new();
    let gateway = Gateway::start(&config, &shutdown).await.unwrap();
    let addr = gateway.local_addr();
    let admin_addr = gateway.admin_addr();
    let handle = tokio::spawn(gateway.run(shutdown.clone()));

    TestGateway {
        addr,
        admin_addr,
        upstream_addr,
        shutdown,
        handle,
        _log_dir: log_dir,
    }
}

/// Client without connection reuse, so a dropped connection only affects
/// the request that caused it.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
