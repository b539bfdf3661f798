// File: src/background/tier_manager/job.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;

use super::config::TierManagerConfig;
use super::logic::{self, SweepReport};
use super::retention;
use crate::error::ServerResult;
use crate::ingest::IngestPipeline;
use crate::traits::{AlertSink, HaltedPartition, PartitionKey, RecordStore, TierStore};

/// Background job that ages records through hot, warm and cold tiers
pub struct TierManager {
    tiers: Arc<dyn TierStore>,
    records: Arc<dyn RecordStore>,
    pipeline: Arc<IngestPipeline>,
    alerts: Arc<dyn AlertSink>,
    config: TierManagerConfig,
    /// Held for the whole of a sweep; sweeps never overlap
    sweep_lock: Mutex<()>,
}

impl TierManager {
    pub fn new(
        tiers: Arc<dyn TierStore>,
        records: Arc<dyn RecordStore>,
        pipeline: Arc<IngestPipeline>,
        alerts: Arc<dyn AlertSink>,
        config: TierManagerConfig,
    ) -> Self {
        Self {
            tiers,
            records,
            pipeline,
            alerts,
            config,
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TierManagerConfig {
        &self.config
    }

    /// Run the job until shutdown signal
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Tier sweep failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Tier manager shutting down");
                    break;
                }
            }
        }
    }

    /// Run one full sweep now
    pub async fn sweep_once(&self) -> ServerResult<SweepReport> {
        let _guard = self.sweep_lock.lock().await;
        let now = Utc::now();

        let mut report = logic::run_sweep(
            &self.tiers,
            &self.records,
            &self.alerts,
            self.config.hot_max_age_days,
            self.config.warm_max_age_days,
            self.config.batch_size,
            now,
        )
        .await?;

        if let Some(days) = self.config.retention_days {
            report.expired_records = retention::expire_retained(
                &self.tiers,
                &self.pipeline,
                days,
                self.config.expiry_chains_per_sweep,
                now,
            )
            .await?;
        }

        if report.staged_cleaned + report.hot_to_warm + report.warm_to_cold + report.expired_records
            > 0
            || !report.halted.is_empty()
        {
            tracing::info!(
                staged_cleaned = report.staged_cleaned,
                hot_to_warm = report.hot_to_warm,
                warm_to_cold = report.warm_to_cold,
                expired = report.expired_records,
                halted = report.halted.len(),
                "Tier sweep complete"
            );
        } else {
            tracing::debug!("Tier sweep found nothing to do");
        }

        Ok(report)
    }

    /// Clear a halt after forensic review
    pub async fn resume_partition(&self, partition: PartitionKey) -> ServerResult<bool> {
        let key = partition.to_string();
        let resumed = logic::blocking(&self.tiers, move |t| t.resume_partition(&partition)).await?;
        if resumed {
            tracing::warn!(partition = %key, "Partition migration resumed by operator");
        }
        Ok(resumed)
    }

    pub async fn halted_partitions(&self) -> ServerResult<Vec<HaltedPartition>> {
        logic::blocking(&self.tiers, |t| t.halted_partitions()).await
    }
}
