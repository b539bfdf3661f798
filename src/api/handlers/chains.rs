//! Chain trail handler

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::dto::{RecordDto, TrailParams};
use crate::api::state::AppState;
use crate::error::ServerError;

/// GET /v1/chains/:chain_key/trail - Ordered records of one chain
pub async fn get_trail(
    State(state): State<Arc<AppState>>,
    Path(chain_key): Path<String>,
    Query(params): Query<TrailParams>,
) -> Result<Json<Vec<RecordDto>>, ServerError> {
    let records = state.query.trail(params.into_request(chain_key)).await?;
    Ok(Json(records.iter().map(RecordDto::from).collect()))
}
