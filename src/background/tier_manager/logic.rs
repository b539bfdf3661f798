// File: src/background/tier_manager/logic.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{ServerError, ServerResult};
use crate::traits::{
    AlertSink, IntegrityAlert, PartitionKey, RecordStore, StorageTier, TierStore, VerificationRun,
};

/// What one sweep did
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub staged_cleaned: u64,
    pub hot_to_warm: u64,
    pub warm_to_cold: u64,
    /// Partitions halted during this sweep
    pub halted: Vec<String>,
    pub expired_records: u64,
}

/// Run a store call on the blocking pool
pub(super) async fn blocking<S, T, F>(store: &Arc<S>, f: F) -> ServerResult<T>
where
    S: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> ServerResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| ServerError::Internal(format!("spawn_blocking failed: {}", e)))?
}

/// Clean leftovers, then move hot→warm and warm→cold
///
/// A failing partition is logged and retried on the next sweep; it does not
/// stop the others.
pub async fn run_sweep(
    tiers: &Arc<dyn TierStore>,
    records: &Arc<dyn RecordStore>,
    alerts: &Arc<dyn AlertSink>,
    hot_max_age_days: u32,
    warm_max_age_days: u32,
    batch_size: usize,
    now: DateTime<Utc>,
) -> ServerResult<SweepReport> {
    let mut report = SweepReport {
        staged_cleaned: blocking(tiers, |t| t.cleanup_staged()).await?,
        ..Default::default()
    };

    let rules = [
        (
            StorageTier::Hot,
            StorageTier::Warm,
            now - Duration::days(hot_max_age_days as i64),
        ),
        (
            StorageTier::Warm,
            StorageTier::Cold,
            now - Duration::days(warm_max_age_days as i64),
        ),
    ];

    for (from, to, cutoff) in rules {
        let partitions = blocking(tiers, move |t| t.migration_partitions(from, cutoff)).await?;
        let mut moved = 0u64;

        for partition in partitions {
            match migrate_partition(tiers, records, alerts, &partition, from, to, cutoff, batch_size)
                .await
            {
                Ok(PartitionOutcome::Migrated(n)) => moved += n,
                Ok(PartitionOutcome::Halted(n)) => {
                    moved += n;
                    report.halted.push(partition.to_string());
                }
                Err(e) => {
                    tracing::error!(
                        partition = %partition,
                        from = %from,
                        to = %to,
                        error = %e,
                        "Partition migration failed, will retry next sweep"
                    );
                }
            }
        }

        match from {
            StorageTier::Hot => report.hot_to_warm = moved,
            _ => report.warm_to_cold = moved,
        }
    }

    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PartitionOutcome {
    Migrated(u64),
    /// Stopped by an integrity failure after moving this many
    Halted(u64),
}

/// Copy-verify-relabel batches of one partition until no candidates remain
#[allow(clippy::too_many_arguments)]
pub(super) async fn migrate_partition(
    tiers: &Arc<dyn TierStore>,
    records: &Arc<dyn RecordStore>,
    alerts: &Arc<dyn AlertSink>,
    partition: &PartitionKey,
    from: StorageTier,
    to: StorageTier,
    cutoff: DateTime<Utc>,
    batch_size: usize,
) -> ServerResult<PartitionOutcome> {
    let mut moved = 0u64;

    loop {
        let p = partition.clone();
        let batch =
            blocking(tiers, move |t| t.migration_batch(&p, from, cutoff, batch_size)).await?;
        if batch.is_empty() {
            break;
        }
        let batch_len = batch.len();

        let p = partition.clone();
        let staged = blocking(tiers, move |t| t.copy_to_tier(&p, to, &batch)).await?;

        let started_at = Utc::now();
        let check = staged.clone();
        let verification = match blocking(tiers, move |t| t.verify_staged(&check)).await {
            Ok(v) => v,
            Err(e) => {
                let discard = staged.clone();
                if let Err(de) = blocking(tiers, move |t| t.discard_staged(&discard)).await {
                    tracing::warn!(error = %de, "Failed to discard staged copy");
                }
                return Err(e);
            }
        };

        let run = VerificationRun {
            target: format!("migration:{}", partition),
            valid: verification.valid,
            checked_count: verification.checked_count,
            first_invalid_record_id: verification.first_invalid_record_id,
            started_at,
            finished_at: Utc::now(),
        };
        if let Err(e) = blocking(records, move |r| r.record_verification(&run)).await {
            tracing::warn!(error = %e, "Failed to persist verification run");
        }

        if !verification.valid {
            let reason = verification
                .error_message
                .clone()
                .unwrap_or_else(|| "verification failed".to_string());

            let discard = staged.clone();
            blocking(tiers, move |t| t.discard_staged(&discard)).await?;
            let (p, r) = (partition.clone(), reason.clone());
            blocking(tiers, move |t| t.halt_partition(&p, &r)).await?;

            tracing::error!(
                partition = %partition,
                from = %from,
                to = %to,
                record_id = ?verification.first_invalid_record_id,
                reason = %reason,
                "Integrity failure, partition migration halted"
            );
            alerts.raise(IntegrityAlert {
                origin: "migration".into(),
                partition: Some(partition.to_string()),
                chain_key: None,
                record_id: verification.first_invalid_record_id,
                reason,
                detected_at: Utc::now(),
            });
            return Ok(PartitionOutcome::Halted(moved));
        }

        let relabel = staged.clone();
        let n = blocking(tiers, move |t| t.relabel(&relabel)).await?;
        moved += n;
        tracing::info!(
            partition = %partition,
            from = %from,
            to = %to,
            records = n,
            checked = verification.checked_count,
            "Batch migrated"
        );

        if batch_len < batch_size || n == 0 {
            break;
        }
    }

    Ok(PartitionOutcome::Migrated(moved))
}
