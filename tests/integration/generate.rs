//! Metered generation endpoint integration tests
//!
//! - POST /api/generate quota enforcement
//! - Idempotency-Key handling
//! - Model backend, fallback, and failure accounting

use std::time::Duration;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{
    api_key_header, constants::*, first_of_april, header_value, idempotency_header, TestHarness,
};
use crate::mocks::MockOpenAI;

#[tokio::test]
async fn test_generate_returns_formula_and_usage() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    let response = harness.generate(&key, "average price").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body,
        json!({
            "formula": "=AVERAGE(B2:B100)",
            "usage": { "current": 1, "limit": 30, "remaining": 29 }
        })
    );
}

#[tokio::test]
async fn test_quota_exhaustion_at_limit() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    harness.spend(&key, 29).await;

    let last = harness.generate(&key, "count rows").await;
    last.assert_status_ok();
    let body: Value = last.json();
    assert_eq!(body["usage"]["current"], 30);
    assert_eq!(body["usage"]["remaining"], 0);

    let rejected = harness.generate(&key, "count rows").await;
    rejected.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = rejected.json();
    assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");
    assert_eq!(body["error"]["details"], json!({ "limit": 30, "usage": 30 }));

    // rejected requests are not counted
    assert_eq!(harness.usage(&key).await["usage"], 30);
}

#[tokio::test]
async fn test_quota_restored_next_month() {
    let harness = TestHarness::with_limit(2).await;
    let key = harness.issue_key(INSTANCE_ID).await;

    harness.spend(&key, 2).await;
    harness
        .generate(&key, "sum")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    harness.clock.set(first_of_april());

    let response = harness.generate(&key, "sum").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["usage"]["current"], 1);
}

#[tokio::test]
async fn test_missing_query_is_counted() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    let response = harness
        .server
        .post("/api/generate")
        .add_header(api_key_header(), header_value(&key))
        .json(&json!({ "sheetDetails": { "Sheet1": ["A", "B"] } }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], "Query is required");
    assert_eq!(harness.usage(&key).await["usage"], 1);
}

#[tokio::test]
async fn test_generate_requires_key() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/api/generate")
        .json(&json!({ "query": "sum" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = harness.generate("ex_unknown", "sum").await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_idempotency_key_counts_once() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    for _ in 0..3 {
        let response = harness
            .server
            .post("/api/generate")
            .add_header(api_key_header(), header_value(&key))
            .add_header(idempotency_header(), header_value("retry-123"))
            .json(&json!({ "query": "sum by region" }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["formula"], "=SUMIFS(C2:C100, A2:A100, \"North\")");
        assert_eq!(body["usage"]["current"], 1);
    }

    assert_eq!(harness.usage(&key).await["usage"], 1);
}

#[tokio::test]
async fn test_concurrent_generations_all_counted() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    let requests = (0..20).map(|_| {
        harness
            .server
            .post("/api/generate")
            .add_header(api_key_header(), header_value(&key))
            .json(&json!({ "query": "sum" }))
    });
    let responses = futures::future::join_all(requests.map(|r| async move { r.await })).await;

    assert!(responses.iter().all(|r| r.status_code() == StatusCode::OK));
    assert_eq!(harness.usage(&key).await["usage"], 20);
}

#[tokio::test]
async fn test_model_formula_is_returned() {
    let openai = MockOpenAI::start().await;
    openai.mock_formula("```excel\n=SUM(D2:D50)\n```").await;
    let harness = TestHarness::with_openai(&openai, true, 5).await;
    let key = harness.issue_key(INSTANCE_ID).await;

    let response = harness.generate(&key, "total of column D").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["formula"], "=SUM(D2:D50)");
    assert_eq!(openai.request_count().await, 1);
}

#[tokio::test]
async fn test_model_failure_uses_heuristic_fallback() {
    let openai = MockOpenAI::start().await;
    openai.mock_error(500).await;
    let harness = TestHarness::with_openai(&openai, true, 5).await;
    let key = harness.issue_key(INSTANCE_ID).await;

    let response = harness.generate(&key, "count the orders").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["formula"], "=COUNTIF(A2:A100, \"Value\")");
}

#[tokio::test]
async fn test_model_failure_without_fallback_still_consumes() {
    let openai = MockOpenAI::start().await;
    openai.mock_error(503).await;
    let harness = TestHarness::with_openai(&openai, false, 5).await;
    let key = harness.issue_key(INSTANCE_ID).await;

    let response = harness.generate(&key, "count the orders").await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "GENERATION_FAILED");
    assert_eq!(harness.usage(&key).await["usage"], 1);
}

#[tokio::test]
async fn test_slow_model_times_out() {
    let openai = MockOpenAI::start().await;
    openai
        .mock_slow_formula("=SUM(A:A)", Duration::from_secs(3))
        .await;
    let harness = TestHarness::with_openai(&openai, false, 1).await;
    let key = harness.issue_key(INSTANCE_ID).await;

    let response = harness.generate(&key, "sum").await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(harness.usage(&key).await["usage"], 1);
}

#[tokio::test]
async fn test_slow_model_falls_back_to_heuristic() {
    let openai = MockOpenAI::start().await;
    openai
        .mock_slow_formula("=SUM(A:A)", Duration::from_secs(3))
        .await;
    let harness = TestHarness::with_openai(&openai, true, 1).await;
    let key = harness.issue_key(INSTANCE_ID).await;

    let response = harness.generate(&key, "count the orders").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["formula"], "=COUNTIF(A2:A100, \"Value\")");
    assert_eq!(body["usage"]["current"], 1);
}

#[tokio::test]
async fn test_oversized_idempotency_key_is_rejected_before_counting() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    let response = harness
        .server
        .post("/api/generate")
        .add_header(api_key_header(), header_value(&key))
        .add_header(idempotency_header(), header_value(&"r".repeat(129)))
        .json(&json!({ "query": "sum" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(harness.usage(&key).await["usage"], 0);

    let response = harness
        .server
        .post("/api/generate")
        .add_header(api_key_header(), header_value(&key))
        .add_header(idempotency_header(), header_value(&"r".repeat(128)))
        .json(&json!({ "query": "sum" }))
        .await;

    response.assert_status_ok();
    assert_eq!(harness.usage(&key).await["usage"], 1);
}
