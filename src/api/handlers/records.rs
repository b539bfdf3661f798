//! Record lookup and tombstone handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::api::dto::{RecordDto, TombstoneRequest};
use crate::api::state::AppState;
use crate::error::ServerError;

/// GET /v1/records/:record_id
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(record_id): Path<String>,
) -> Result<Json<RecordDto>, ServerError> {
    let id = Uuid::parse_str(&record_id)?;
    let record = state.query.record(id).await?;
    Ok(Json(RecordDto::from(&record)))
}

/// POST /v1/records/:record_id/tombstone - Append an override record
///
/// The target is never modified; the tombstone is a new record on the
/// target's chain.
pub async fn tombstone_record(
    State(state): State<Arc<AppState>>,
    Path(record_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<RecordDto>), ServerError> {
    let id = Uuid::parse_str(&record_id)?;
    let req: TombstoneRequest = serde_json::from_slice(&body)
        .map_err(|e| ServerError::InvalidArgument(format!("Invalid JSON: {}", e)))?;

    let outcome = state
        .pipeline
        .tombstone(id, &req.reason, &req.requested_by)
        .await?;
    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(RecordDto::from(&outcome.record))))
}
