//! Formula generation endpoint
//!
//! The only billable route. The request is counted against the key's
//! monthly quota before the generator runs.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Extension, Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    generation::GenerationRequest,
    keys::key_fingerprint,
    middleware::api_key::AuthenticatedKey,
    routes::metrics::record_generation,
    service::Consumption,
    AppState,
};

/// Header a client may set so a retried request is only counted once
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Longest accepted idempotency key, in bytes
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Generation response body
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub formula: String,
    pub usage: Consumption,
}

fn idempotency_key(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    match key {
        Some(k) if k.len() > MAX_IDEMPOTENCY_KEY_LEN => Err(AppError::Validation(format!(
            "Idempotency-Key must be at most {} bytes",
            MAX_IDEMPOTENCY_KEY_LEN
        ))),
        _ => Ok(key),
    }
}

/// `POST /api/generate`
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedKey(record)): Extension<AuthenticatedKey>,
    headers: HeaderMap,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> AppResult<Json<GenerateResponse>> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let request_id = idempotency_key(&headers)?;

    let usage = state.access.consume_for(&record, request_id).await?;

    // Counted even when the query turns out to be missing.
    if request.query.trim().is_empty() {
        return Err(AppError::Validation("Query is required".to_string()));
    }

    let start = Instant::now();
    let result = state.generator.generate(&request).await;
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(generated) => {
            record_generation(generated.generator, "success", elapsed);
            info!(
                api_key = %key_fingerprint(&record.api_key),
                generator = generated.generator,
                usage = usage.current,
                duration_ms = (elapsed * 1000.0) as u64,
                "Formula generated"
            );
            Ok(Json(GenerateResponse {
                formula: generated.formula,
                usage,
            }))
        }
        Err(e) => {
            let generator = state.generator.name();
            record_generation(generator, "error", elapsed);
            warn!(
                api_key = %key_fingerprint(&record.api_key),
                generator,
                error = %e,
                "Formula generation failed"
            );
            Err(e)
        }
    }
}
