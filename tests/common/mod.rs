//! Common test utilities for Keymeter
//!
//! Builds the real router over an in-memory store and a manual clock so
//! tests can fill quotas and cross month boundaries deterministically.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{DateTime, FixedOffset, TimeZone};
use serde_json::{json, Value};

use keymeter::{
    routes,
    service::ManualClock,
    AppState, Config, FallbackGenerator, Generator, HeuristicGenerator, InMemoryStore,
    OpenAiGenerator, Store,
};

use crate::mocks::{MockOpenAI, TEST_OPENAI_API_KEY};

/// Test configuration constants
pub mod constants {
    /// A valid office instance id
    pub const INSTANCE_ID: &str = "office-instance-0001";
    /// A second valid office instance id
    pub const OTHER_INSTANCE_ID: &str = "office-instance-0002";
    /// Salt the test config derives keys with
    pub const TEST_SALT: &str = "test-salt";
}

pub fn api_key_header() -> HeaderName {
    HeaderName::from_static("x-api-key")
}

pub fn idempotency_header() -> HeaderName {
    HeaderName::from_static("idempotency-key")
}

pub fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).expect("invalid header value")
}

/// Mid-month instant used as the harness's starting time
pub fn mid_march() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 15, 12, 0, 0)
        .unwrap()
}

pub fn first_of_april() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 4, 1, 0, 0, 0)
        .unwrap()
}

/// Real app router over in-memory storage
pub struct TestHarness {
    pub server: TestServer,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub config: Config,
}

impl TestHarness {
    /// Harness with the heuristic generator and the default free-tier limit
    pub async fn new() -> Self {
        Self::with_parts(Config::for_testing(), Arc::new(HeuristicGenerator))
    }

    /// Harness with a custom free-tier limit
    pub async fn with_limit(limit: u64) -> Self {
        let config = Config {
            free_tier_limit: limit,
            ..Config::for_testing()
        };
        Self::with_parts(config, Arc::new(HeuristicGenerator))
    }

    /// Harness whose generator calls `openai`, optionally behind the heuristic fallback
    pub async fn with_openai(openai: &MockOpenAI, fallback: bool, timeout_seconds: u64) -> Self {
        let config = Config {
            openai_api_url: openai.uri(),
            openai_api_key: Some(TEST_OPENAI_API_KEY.to_string()),
            generation_timeout_seconds: timeout_seconds,
            generation_fallback: fallback,
            ..Config::for_testing()
        };

        let model = OpenAiGenerator::new(reqwest::Client::new(), &config)
            .expect("OpenAI key is configured");
        let generator: Arc<dyn Generator> = if fallback {
            Arc::new(FallbackGenerator::new(Arc::new(model)))
        } else {
            Arc::new(model)
        };

        Self::with_parts(config, generator)
    }

    fn with_parts(config: Config, generator: Arc<dyn Generator>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(mid_march()));
        let dyn_store: Arc<dyn Store> = store.clone();

        let state = Arc::new(AppState::new_for_testing(
            config.clone(),
            dyn_store,
            generator,
            clock.clone(),
        ));
        let server = TestServer::new(routes::create_router(state))
            .expect("Failed to create test server");

        Self {
            server,
            store,
            clock,
            config,
        }
    }

    /// Issue (or fetch) the key for `instance_id` through the API
    pub async fn issue_key(&self, instance_id: &str) -> String {
        let response = self
            .server
            .post("/api/generate-key")
            .json(&json!({ "officeInstanceId": instance_id }))
            .await;
        let body: Value = response.json();
        body["apiKey"]
            .as_str()
            .expect("apiKey in response")
            .to_string()
    }

    /// Call `/api/generate` with `query`
    pub async fn generate(&self, api_key: &str, query: &str) -> axum_test::TestResponse {
        self.server
            .post("/api/generate")
            .add_header(api_key_header(), header_value(api_key))
            .json(&json!({ "query": query }))
            .await
    }

    /// Spend `n` requests, asserting each one succeeds
    pub async fn spend(&self, api_key: &str, n: u64) {
        for _ in 0..n {
            self.generate(api_key, "sum of sales").await.assert_status(StatusCode::OK);
        }
    }

    /// Fetch the usage summary for `api_key`
    pub async fn usage(&self, api_key: &str) -> Value {
        let response = self
            .server
            .get("/api/usage")
            .add_header(api_key_header(), header_value(api_key))
            .await;
        response.assert_status_ok();
        response.json()
    }
}
