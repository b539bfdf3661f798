//! Application state shared across HTTP handlers

use std::sync::Arc;
use std::time::Instant;

use crate::background::TierManager;
use crate::ingest::IngestPipeline;
use crate::query::QueryService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Write path
    pub pipeline: Arc<IngestPipeline>,

    /// Read and verify path
    pub query: Arc<QueryService>,

    /// Partition halt management
    pub tier_manager: Arc<TierManager>,

    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        query: Arc<QueryService>,
        tier_manager: Arc<TierManager>,
    ) -> Self {
        Self {
            pipeline,
            query,
            tier_manager,
            started_at: Instant::now(),
        }
    }
}
