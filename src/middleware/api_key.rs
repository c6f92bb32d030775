//! API key middleware
//!
//! Resolves the `x-api-key` header against the key registry.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use crate::{
    error::AppError,
    keys::{key_fingerprint, ApiKeyRecord},
    AppState,
};

/// Header carrying the client's API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// The resolved key record, inserted into request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedKey(pub ApiKeyRecord);

/// Read a non-empty API key from `headers`
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

/// API key middleware
///
/// 401 when the header is missing, 403 when the key is unknown.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn api_key_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = extract_api_key(request.headers()).ok_or(AppError::MissingApiKey)?;

    let record = match state.registry.get_by_key(api_key).await {
        Ok(record) => record,
        Err(e) => {
            warn!(api_key = %key_fingerprint(api_key), error = %e, "API key rejected");
            return Err(e);
        }
    };

    debug!(
        api_key = %key_fingerprint(&record.api_key),
        tier = record.tier.as_str(),
        "API key accepted"
    );

    request.extensions_mut().insert(AuthenticatedKey(record));

    Ok(next.run(request).await)
}
