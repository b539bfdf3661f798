// File: src/background/mod.rs

//! Background job management for tier lifecycle
//!
//! The tier manager discovers aged records by querying the database on each
//! tick. It never blocks the ingestion path: migrations touch only records
//! older than the hot threshold, and the tier of a record changes in a
//! single transaction.

pub mod config;
pub mod tier_manager;

use crate::error::ServerResult;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use config::BackgroundConfig;
pub use tier_manager::{SweepReport, TierManager, TierManagerConfig, RETENTION_EVENT_TYPE};

/// Background job runner
///
/// Jobs run continuously until shutdown.
pub struct BackgroundJobRunner {
    tier_manager: Arc<TierManager>,
    config: BackgroundConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl BackgroundJobRunner {
    pub fn new(tier_manager: Arc<TierManager>, config: BackgroundConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            tier_manager,
            config,
            shutdown_tx,
        }
    }

    /// Start all background jobs
    pub async fn start(&self) -> ServerResult<Vec<tokio::task::JoinHandle<()>>> {
        if self.config.disabled {
            tracing::info!("Background jobs disabled via LEDGER_BACKGROUND_DISABLED=true");
            return Ok(vec![]);
        }

        let mut handles = Vec::new();

        {
            let manager = Arc::clone(&self.tier_manager);
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                manager.run(shutdown_rx).await;
            }));
            let tm = self.tier_manager.config();
            tracing::info!(
                interval_secs = tm.interval_secs,
                hot_max_age_days = tm.hot_max_age_days,
                warm_max_age_days = tm.warm_max_age_days,
                retention_days = ?tm.retention_days,
                "Tier Manager job started"
            );
        }

        tracing::info!(job_count = handles.len(), "Background jobs started");

        Ok(handles)
    }

    /// Signal all jobs to shutdown gracefully
    pub fn shutdown(&self) {
        tracing::info!("Signaling background jobs to shutdown");
        let _ = self.shutdown_tx.send(());
    }
}
