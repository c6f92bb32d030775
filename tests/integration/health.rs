//! Health endpoint integration tests
//!
//! - GET /api/health - Minimal status
//! - GET /health - Full health check with store status
//! - GET /health/ready - Readiness probe
//! - GET /health/live - Liveness probe

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::TestHarness;

#[tokio::test]
async fn test_api_health() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/api/health").await;

    response.assert_status_ok();
    response.assert_json(&json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_full_health_reports_store() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["store"]["backend"], "memory");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].is_string());
    assert!(body["uptime_seconds"].is_u64());
    assert!(body.get("stats").is_none());
}

#[tokio::test]
async fn test_store_outage_fails_readiness() {
    let harness = TestHarness::new().await;
    harness.store.set_unavailable(true);

    let response = harness.server.get("/health").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["status"], "unhealthy");
    assert!(body["checks"]["store"]["error"].is_string());

    let response = harness.server.get("/health/ready").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    // liveness does not depend on storage
    harness.server.get("/health/live").await.assert_status_ok();
}

#[tokio::test]
async fn test_health_endpoints_reject_post() {
    let harness = TestHarness::new().await;

    let response = harness.server.post("/health").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);

    let response = harness.server.post("/api/health").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    keymeter::routes::metrics::init_metrics();
    let harness = TestHarness::new().await;
    let key = harness.issue_key("metrics-instance-01").await;
    harness.spend(&key, 1).await;

    let response = harness.server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("keymeter_quota_decisions_total"));
}
