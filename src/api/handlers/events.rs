//! Event ingestion and listing handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::api::dto::{IngestRequest, IngestResponse, ListParams, RecordDto};
use crate::api::state::AppState;
use crate::error::ServerError;

/// POST /v1/events - Ingest one event
///
/// 201 for a new commit, 200 with `duplicate: true` for an absorbed
/// redelivery.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ServerError> {
    let req: IngestRequest = serde_json::from_slice(&body)
        .map_err(|e| ServerError::InvalidArgument(format!("Invalid JSON: {}", e)))?;

    let outcome = state.pipeline.ingest(req.into_candidate()?).await?;
    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(IngestResponse::from(&outcome))))
}

/// GET /v1/events - Most recently ingested records
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RecordDto>>, ServerError> {
    let records = state.query.list(params.into()).await?;
    Ok(Json(records.iter().map(RecordDto::from).collect()))
}
