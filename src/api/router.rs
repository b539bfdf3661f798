//! Router setup and configuration

use std::sync::Arc;

use axum::{routing::get, routing::post, Router};

use crate::api::handlers;
use crate::api::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_v1 = Router::new()
        .route(
            "/events",
            post(handlers::ingest_event).get(handlers::list_events),
        )
        .route("/chains/:chain_key/trail", get(handlers::get_trail))
        .route("/records/:record_id", get(handlers::get_record))
        .route(
            "/records/:record_id/tombstone",
            post(handlers::tombstone_record),
        )
        .route("/verify", post(handlers::verify))
        .route("/stats", get(handlers::get_stats))
        .route("/partitions/halted", get(handlers::list_halted))
        .route(
            "/partitions/:domain/:date/resume",
            post(handlers::resume_partition),
        );

    Router::new()
        .nest("/v1", api_v1)
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
