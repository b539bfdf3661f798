//! Ingestion pipeline: validate, serialize per chain, chain, persist, notify

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::idempotency::IdempotencyCache;
use super::lease::ChainLeases;
use super::retry::{run_blocking_with_retry, RetryPolicy};
use super::{CandidateEvent, IngestConfig};
use crate::chain::{self, ChainFields};
use crate::error::{ServerError, ServerResult};
use crate::traits::{
    CommitNotifier, EventRecord, InsertOutcome, PartitionKey, RecordCommitted, RecordStore,
    StorageTier,
};

/// Event type of override records appended by [`IngestPipeline::tombstone`]
pub const TOMBSTONE_EVENT_TYPE: &str = "ledger.tombstone";

/// `source` of records the store appends itself
pub const SYSTEM_SOURCE: &str = "ledger-store";

/// Result of a successful ingest
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub record: EventRecord,
    /// The idempotency key was already committed; `record` is the original
    pub duplicate: bool,
}

/// Turns candidate events into committed hot-tier records
pub struct IngestPipeline {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn CommitNotifier>,
    leases: ChainLeases,
    cache: IdempotencyCache,
    retry: RetryPolicy,
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn CommitNotifier>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            leases: ChainLeases::new(),
            cache: IdempotencyCache::new(
                Duration::from_secs(config.idempotency_ttl_secs),
                config.idempotency_capacity,
            ),
            retry: RetryPolicy::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Ingest one event
    ///
    /// Redelivery of an already committed idempotency key returns the
    /// original record with `duplicate = true`.
    pub async fn ingest(&self, event: CandidateEvent) -> ServerResult<IngestOutcome> {
        if let Err(e) = event.validate(&self.config) {
            warn!(
                idempotency_key = %event.idempotency_key,
                source = %event.source,
                error = %e,
                "Event rejected"
            );
            return Err(e);
        }
        let chain_key = event.resolve_chain_key();
        self.append(event, chain_key).await
    }

    /// Append an override record marking `record_id` as withdrawn
    ///
    /// The target record itself is never modified.
    pub async fn tombstone(
        &self,
        record_id: Uuid,
        reason: &str,
        requested_by: &str,
    ) -> ServerResult<IngestOutcome> {
        if reason.trim().is_empty() {
            return Err(ServerError::Validation("reason is required".into()));
        }
        if requested_by.trim().is_empty() {
            return Err(ServerError::Validation("requested_by is required".into()));
        }

        let store = Arc::clone(&self.store);
        let target = tokio::task::spawn_blocking(move || store.get_record(&record_id))
            .await
            .map_err(|e| ServerError::Internal(format!("spawn_blocking failed: {}", e)))??;

        let payload = serde_json::to_vec(&json!({
            "target_record_id": target.record_id,
            "target_sequence_no": target.sequence_no,
            "reason": reason,
            "requested_by": requested_by,
        }))?;

        let event = CandidateEvent {
            idempotency_key: format!("tombstone:{}", target.record_id),
            event_type: TOMBSTONE_EVENT_TYPE.to_string(),
            event_subtype: Some(target.event_type.clone()),
            source: SYSTEM_SOURCE.to_string(),
            chain_key: None,
            occurred_at: Utc::now(),
            payload,
        };
        event.validate(&self.config)?;

        info!(
            target_record_id = %target.record_id,
            chain_key = %target.chain_key,
            requested_by,
            "Tombstone requested"
        );
        // Same chain as the target, already validated when it was committed
        self.append(event, target.chain_key).await
    }

    async fn append(&self, event: CandidateEvent, chain_key: String) -> ServerResult<IngestOutcome> {
        if let Some(record) = self.cache.get(&event.idempotency_key) {
            debug!(
                idempotency_key = %event.idempotency_key,
                record_id = %record.record_id,
                "Duplicate absorbed from cache"
            );
            return Ok(IngestOutcome {
                record,
                duplicate: true,
            });
        }

        let lease = self
            .leases
            .acquire(
                &chain_key,
                Duration::from_millis(self.config.lease_timeout_ms),
            )
            .await
            .inspect_err(|e| warn!(chain_key = %chain_key, error = %e, "Chain lease timeout"))?;

        let store = Arc::clone(&self.store);
        let event = Arc::new(event);
        let key = chain_key.clone();
        let result = run_blocking_with_retry(self.retry, "append", move || {
            append_blocking(store.as_ref(), &key, &event)
        })
        .await;
        drop(lease);

        let outcome = result?;
        self.cache.insert(&outcome.record);

        if outcome.duplicate {
            debug!(
                idempotency_key = %outcome.record.idempotency_key,
                record_id = %outcome.record.record_id,
                "Duplicate absorbed"
            );
        } else {
            info!(
                record_id = %outcome.record.record_id,
                chain_key = %outcome.record.chain_key,
                sequence_no = outcome.record.sequence_no,
                event_type = %outcome.record.event_type,
                "Record committed"
            );
            self.notifier
                .notify(RecordCommitted::from(&outcome.record));
        }

        Ok(outcome)
    }
}

/// Durable idempotency check, chain head read, hash and insert
///
/// Runs under the chain lease; each retry attempt starts over from the
/// durable state.
fn append_blocking(
    store: &dyn RecordStore,
    chain_key: &str,
    event: &CandidateEvent,
) -> ServerResult<IngestOutcome> {
    if let Some(existing) = store.find_by_idempotency_key(&event.idempotency_key)? {
        return Ok(IngestOutcome {
            record: existing,
            duplicate: true,
        });
    }

    let head = store.chain_head(chain_key)?;
    let commit = chain::commit(
        head.as_ref(),
        &ChainFields {
            chain_key,
            event_type: &event.event_type,
            source: &event.source,
            occurred_at: event.occurred_at,
            payload: &event.payload,
        },
    );

    let ingested_at = Utc::now();
    let record = EventRecord {
        record_id: Uuid::new_v4(),
        chain_key: chain_key.to_string(),
        sequence_no: commit.sequence_no,
        event_type: event.event_type.clone(),
        event_subtype: event.event_subtype.clone(),
        source: event.source.clone(),
        occurred_at: event.occurred_at,
        ingested_at,
        payload: event.payload.clone(),
        content_hash: commit.content_hash,
        prev_hash: commit.prev_hash,
        storage_tier: StorageTier::Hot,
        idempotency_key: event.idempotency_key.clone(),
        partition: PartitionKey::for_record(chain_key, ingested_at),
    };

    match store.insert_record(&record)? {
        InsertOutcome::Inserted => Ok(IngestOutcome {
            record,
            duplicate: false,
        }),
        InsertOutcome::Duplicate(existing) => Ok(IngestOutcome {
            record: *existing,
            duplicate: true,
        }),
    }
}
