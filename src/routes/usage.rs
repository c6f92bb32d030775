//! Usage lookup endpoint

use std::sync::Arc;

use axum::{extract::State, Extension, Json};

use crate::{
    error::AppResult, middleware::api_key::AuthenticatedKey, service::UsageSummary, AppState,
};

/// `GET /api/usage`
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedKey(record)): Extension<AuthenticatedKey>,
) -> AppResult<Json<UsageSummary>> {
    Ok(Json(state.access.usage_for(&record).await?))
}
