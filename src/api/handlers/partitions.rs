//! Halted partition handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;

use crate::api::dto::{HaltedPartitionDto, ResumeResponse};
use crate::api::state::AppState;
use crate::error::ServerError;
use crate::traits::PartitionKey;

/// GET /v1/partitions/halted
pub async fn list_halted(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HaltedPartitionDto>>, ServerError> {
    let halted = state.tier_manager.halted_partitions().await?;
    Ok(Json(halted.iter().map(HaltedPartitionDto::from).collect()))
}

/// POST /v1/partitions/:domain/:date/resume - Clear a migration halt
pub async fn resume_partition(
    State(state): State<Arc<AppState>>,
    Path((domain, date)): Path<(String, String)>,
) -> Result<Json<ResumeResponse>, ServerError> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| ServerError::InvalidArgument(format!("partition date: {}", e)))?;
    let partition = PartitionKey { domain, date };
    let label = partition.to_string();

    let resumed = state.tier_manager.resume_partition(partition).await?;
    Ok(Json(ResumeResponse {
        partition: label,
        resumed,
    }))
}
