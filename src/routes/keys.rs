//! Key issuance endpoint

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{error::AppError, service::KeyGrant, AppState};

/// Key issuance request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyRequest {
    #[serde(default)]
    pub office_instance_id: Option<String>,
}

/// `POST /api/generate-key`
///
/// 201 when the key was issued by this call, 200 when the instance already
/// had one.
pub async fn generate_key(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<KeyGrant>), AppError> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let instance_id = request
        .office_instance_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("Office instance ID is required".to_string()))?;

    let grant = state.access.ensure_key(&instance_id).await?;
    let status = if grant.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(grant)))
}
