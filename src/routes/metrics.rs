//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    let _ = &*PROMETHEUS_HANDLE;
    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!("keymeter_keys_issued_total", "API keys issued");
    metrics::describe_counter!(
        "keymeter_quota_decisions_total",
        "Quota gate decisions by outcome"
    );
    metrics::describe_counter!(
        "keymeter_generations_total",
        "Formula generations by backend and status"
    );
    metrics::describe_histogram!(
        "keymeter_request_duration_seconds",
        "Generate request duration in seconds"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

pub fn record_key_issued() {
    metrics::counter!("keymeter_keys_issued_total").increment(1);
}

/// Record a quota gate outcome (`allowed` or `rejected`)
pub fn record_quota_decision(decision: &'static str) {
    metrics::counter!("keymeter_quota_decisions_total", "decision" => decision).increment(1);
}

/// Record a finished generation
pub fn record_generation(generator: &'static str, status: &'static str, duration_secs: f64) {
    metrics::counter!(
        "keymeter_generations_total",
        "generator" => generator,
        "status" => status
    )
    .increment(1);
    metrics::histogram!("keymeter_request_duration_seconds", "generator" => generator)
        .record(duration_secs);
}
