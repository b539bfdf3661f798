// File: src/background/tier_manager/retention.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use super::logic::blocking;
use crate::error::{ServerError, ServerResult};
use crate::ingest::{CandidateEvent, IngestPipeline, SYSTEM_SOURCE};
use crate::traits::{ExpiryPlan, TierStore, RETENTION_CHAIN_KEY};

/// Event type of the records documenting an expiry
pub const RETENTION_EVENT_TYPE: &str = "ledger.retention";

/// Expire cold chain prefixes older than the retention period
///
/// Each expiry is documented by a record on the retention chain, committed
/// before anything is deleted. A rerun after a crash finds the same plan and
/// the same idempotency key, so the documenting record is not duplicated.
pub async fn expire_retained(
    tiers: &Arc<dyn TierStore>,
    pipeline: &IngestPipeline,
    retention_days: u32,
    max_chains: usize,
    now: DateTime<Utc>,
) -> ServerResult<u64> {
    let cutoff = now - Duration::days(retention_days as i64);
    let plans = blocking(tiers, move |t| t.expiry_plans(cutoff, max_chains)).await?;
    let mut removed = 0u64;

    for plan in plans {
        let event = retention_event(&plan, retention_days, now);
        match pipeline.ingest(event).await {
            Ok(_) => {}
            Err(ServerError::Validation(reason)) => {
                tracing::warn!(
                    chain_key = %plan.chain_key,
                    reason = %reason,
                    "Retention record rejected, chain not expired"
                );
                continue;
            }
            Err(e) => return Err(e),
        }

        let chain_key = plan.chain_key.clone();
        let n = blocking(tiers, move |t| t.expire(&plan)).await?;
        if n > 0 {
            tracing::info!(chain_key = %chain_key, records = n, "Chain prefix expired");
        }
        removed += n;
    }

    Ok(removed)
}

fn retention_event(plan: &ExpiryPlan, retention_days: u32, now: DateTime<Utc>) -> CandidateEvent {
    let payload = json!({
        "chain_key": plan.chain_key,
        "from_sequence": plan.from_sequence,
        "through_sequence": plan.through_sequence,
        "through_hash": hex::encode(plan.through_hash),
        "record_count": plan.record_count,
        "retention_days": retention_days,
    });

    CandidateEvent {
        idempotency_key: format!("retention:{}:{}", plan.chain_key, plan.through_sequence),
        event_type: RETENTION_EVENT_TYPE.to_string(),
        event_subtype: None,
        source: SYSTEM_SOURCE.to_string(),
        chain_key: Some(RETENTION_CHAIN_KEY.to_string()),
        occurred_at: now,
        payload: payload.to_string().into_bytes(),
    }
}
