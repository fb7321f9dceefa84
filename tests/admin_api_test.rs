//! Admin API tests against a running gatekeeper.

use axum::http::StatusCode;
use serde_json::Value;
use std::time::Duration;

mod common;

const PROBER: &str = "192.0.2.99";

async fn ban_prober(gw: &common::TestGateway) {
    let client = common::client();
    for path in ["/.env", "/phpmyadmin", "/.git/config"] {
        let _ = client.get(gw.url(path)).header("x-forwarded-for", PROBER).send().await;
    }
}

async fn admin_get(gw: &common::TestGateway, path: &str) -> Value {
    let res = common::client()
        .get(gw.admin_url(path))
        .bearer_auth(common::ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

/// The file writer is asynchronous; poll until `expected` records are visible.
async fn poll_logs(gw: &common::TestGateway, path: &str, expected: usize) -> Vec<Value> {
    for _ in 0..50 {
        let records = admin_get(gw, path).await;
        let records = records.as_array().cloned().unwrap_or_default();
        if records.len() >= expected {
            assert_eq!(records.len(), expected);
            return records;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} records from {}", expected, path);
}

#[tokio::test]
async fn test_admin_requires_key() {
    let gw = common::start_gatekeeper(|_| {}).await;
    let client = common::client();

    let res = client.get(gw.admin_url("/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(gw.admin_url("/admin/bans"))
        .bearer_auth("wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    gw.stop().await;
}

#[tokio::test]
async fn test_status_and_bans_reflect_escalation() {
    let gw = common::start_gatekeeper(|_| {}).await;

    let status = admin_get(&gw, "/admin/status").await;
    assert_eq!(status["status"], "operational");
    assert_eq!(status["banned_clients"], 0);

    ban_prober(&gw).await;

    let status = admin_get(&gw, "/admin/status").await;
    assert_eq!(status["banned_clients"], 1);
    assert_eq!(status["suspicious_clients"], 0);

    let bans = admin_get(&gw, "/admin/bans").await;
    let bans = bans.as_array().unwrap();
    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0]["address"], PROBER);

    gw.stop().await;
}

#[tokio::test]
async fn test_security_logs_filter_by_type() {
    let gw = common::start_gatekeeper(|_| {}).await;

    let res = common::client().get(gw.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    ban_prober(&gw).await;

    let banned = poll_logs(&gw, "/admin/security-logs?type=banned", 1).await;
    assert_eq!(banned[0]["client"], PROBER);
    assert_eq!(banned[0]["outcome"]["kind"], "banned");

    let blocked = poll_logs(&gw, "/admin/security-logs?type=blocked", 3).await;
    assert!(blocked
        .iter()
        .all(|record| record["outcome"]["kind"] == "terminated"));

    let all = admin_get(&gw, "/admin/security-logs?limit=2").await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    gw.stop().await;
}

#[tokio::test]
async fn test_security_logs_empty_when_log_disabled() {
    let gw = common::start_gatekeeper(|config| {
        config.access_log.enabled = false;
    })
    .await;

    let _ = common::client().get(gw.url("/")).send().await.unwrap();
    let logs = admin_get(&gw, "/admin/security-logs").await;
    assert!(logs.as_array().unwrap().is_empty());

    gw.stop().await;
}
