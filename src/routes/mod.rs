//! HTTP routes for Keymeter
//!
//! This module defines all HTTP endpoints exposed by the service.

pub mod generate;
pub mod health;
pub mod keys;
pub mod metrics;
pub mod usage;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{middleware::api_key::api_key_middleware, AppState};

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Routes that require a valid x-api-key
    let keyed_routes = Router::new()
        .route("/api/usage", get(usage::get_usage))
        .route("/api/generate", post(generate::generate))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ));

    let public_routes = Router::new()
        .route("/api/generate-key", post(keys::generate_key))
        .route("/api/health", get(health::api_health))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    Router::new()
        .merge(public_routes)
        .merge(keyed_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
