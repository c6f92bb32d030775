//! Usage endpoint integration tests
//!
//! - GET /api/usage
//! - x-api-key middleware behavior

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use keymeter::keys::{ApiKeyRecord, Tier};
use keymeter::Store;

use crate::common::{api_key_header, constants::*, first_of_april, header_value, TestHarness};

#[tokio::test]
async fn test_fresh_key_has_full_allowance() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    assert_eq!(
        harness.usage(&key).await,
        json!({ "usage": 0, "limit": 30, "tier": "free", "remaining": 30 })
    );
}

#[tokio::test]
async fn test_usage_tracks_generations() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    harness.spend(&key, 29).await;

    let body = harness.usage(&key).await;
    assert_eq!(body["usage"], 29);
    assert_eq!(body["remaining"], 1);
}

#[tokio::test]
async fn test_usage_read_is_not_billable() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    for _ in 0..5 {
        harness.usage(&key).await;
    }

    assert_eq!(harness.usage(&key).await["usage"], 0);
}

#[tokio::test]
async fn test_usage_resets_in_new_month() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;
    harness.spend(&key, 4).await;

    harness.clock.set(first_of_april());

    let body = harness.usage(&key).await;
    assert_eq!(body["usage"], 0);
    assert_eq!(body["remaining"], 30);
}

#[tokio::test]
async fn test_keys_are_metered_independently() {
    let harness = TestHarness::new().await;
    let a = harness.issue_key(INSTANCE_ID).await;
    let b = harness.issue_key(OTHER_INSTANCE_ID).await;

    harness.spend(&a, 3).await;

    assert_eq!(harness.usage(&a).await["usage"], 3);
    assert_eq!(harness.usage(&b).await["usage"], 0);
}

#[tokio::test]
async fn test_unlimited_tier_reports_unlimited() {
    let harness = TestHarness::new().await;
    harness
        .store
        .insert_key_if_absent(ApiKeyRecord::new(
            "paid-instance-0001",
            "ex_paidkey",
            Tier::Unlimited,
            chrono::Utc::now(),
        ))
        .await
        .unwrap();

    harness.spend("ex_paidkey", 2).await;

    assert_eq!(
        harness.usage("ex_paidkey").await,
        json!({ "usage": 2, "limit": "unlimited", "tier": "unlimited", "remaining": "unlimited" })
    );
}

#[tokio::test]
async fn test_missing_api_key() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/api/usage").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "API_KEY_REQUIRED");
}

#[tokio::test]
async fn test_unknown_api_key() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .get("/api/usage")
        .add_header(api_key_header(), header_value("ex_00000000000000000000000000000000"))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "INVALID_API_KEY");
}

#[tokio::test]
async fn test_storage_outage_is_server_error() {
    let harness = TestHarness::new().await;
    let key = harness.issue_key(INSTANCE_ID).await;

    harness.store.set_unavailable(true);

    let response = harness
        .server
        .get("/api/usage")
        .add_header(api_key_header(), header_value(&key))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "STORAGE_ERROR");
}
