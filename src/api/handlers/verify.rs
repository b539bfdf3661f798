//! Verification and statistics handlers

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};

use crate::api::dto::VerifyRequest;
use crate::api::state::AppState;
use crate::error::ServerError;
use crate::query::VerificationReport;
use crate::traits::StoreStats;

/// POST /v1/verify - Verify a chain or a set of records
pub async fn verify(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<VerificationReport>, ServerError> {
    let req: VerifyRequest = serde_json::from_slice(&body)
        .map_err(|e| ServerError::InvalidArgument(format!("Invalid JSON: {}", e)))?;
    let report = state.query.verify(req.into_target()?).await?;
    Ok(Json(report))
}

/// GET /v1/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StoreStats>, ServerError> {
    Ok(Json(state.query.stats().await?))
}
