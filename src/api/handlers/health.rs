//! Health check handler

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health
///
/// Returns 200 OK if storage is reachable, 503 Service Unavailable if not.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let storage_healthy = state.query.is_healthy();
    let response = HealthResponse {
        status: if storage_healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        storage_healthy,
        error: (!storage_healthy).then(|| "Storage unavailable".to_string()),
    };

    if storage_healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
