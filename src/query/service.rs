//! Tier-transparent read service

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::report::{RecordCheck, RecordStatus, VerificationReport, VerifyTarget};
use super::QueryConfig;
use crate::chain::{recompute_hash, verify_link, ChainVerification};
use crate::error::{ServerError, ServerResult};
use crate::traits::{
    AlertSink, CheckedRecord, EventRecord, IntegrityAlert, ListFilter, RecordStore, StoreStats,
    TrailQuery, VerificationRun,
};

/// Default number of records returned by [`QueryService::list`]
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Largest accepted list limit
pub const MAX_LIST_LIMIT: usize = 200;

/// Trail read request
#[derive(Debug, Clone, Default)]
pub struct TrailRequest {
    pub chain_key: String,
    /// Inclusive lower bound on `ingested_at`
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `ingested_at`
    pub until: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub from_sequence: Option<u64>,
    pub to_sequence: Option<u64>,
    pub limit: Option<usize>,
}

/// Recent-record listing request
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub source: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<usize>,
}

/// Read path over every tier
///
/// Callers never need to know where a record lives; the store resolves the
/// payload from its current tier.
pub struct QueryService {
    store: Arc<dyn RecordStore>,
    alerts: Arc<dyn AlertSink>,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(store: Arc<dyn RecordStore>, alerts: Arc<dyn AlertSink>, config: QueryConfig) -> Self {
        Self {
            store,
            alerts,
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Records of one chain in ascending sequence order
    ///
    /// Fails with `PartialResult` if the deadline passes while pages remain;
    /// a truncated trail is never returned as success. Without an explicit
    /// `limit`, a trail longer than `max_trail_limit` is rejected so the
    /// caller pages with `from_sequence`.
    pub async fn trail(&self, request: TrailRequest) -> ServerResult<Vec<EventRecord>> {
        if request.chain_key.trim().is_empty() {
            return Err(ServerError::Validation("chain_key is required".into()));
        }
        if let (Some(since), Some(until)) = (request.since, request.until) {
            if since >= until {
                return Err(ServerError::Validation("since must be before until".into()));
            }
        }
        if let (Some(from), Some(to)) = (request.from_sequence, request.to_sequence) {
            if from > to {
                return Err(ServerError::Validation(
                    "from_sequence must not exceed to_sequence".into(),
                ));
            }
        }
        let limit = match request.limit {
            Some(0) => return Err(ServerError::Validation("limit must be positive".into())),
            Some(n) => n.min(self.config.max_trail_limit),
            None => self.config.max_trail_limit,
        };

        let query = Arc::new(TrailQuery {
            chain_key: request.chain_key,
            since: request.since,
            until: request.until,
            event_type: request.event_type,
            from_sequence: request.from_sequence,
            to_sequence: request.to_sequence,
        });
        let deadline = self.deadline();
        let page_size = self.config.page_size.max(1);

        let mut out: Vec<EventRecord> = Vec::new();
        let mut after: Option<u64> = None;
        loop {
            let want = page_size.min(limit - out.len());
            let q = Arc::clone(&query);
            // One extra row tells whether another page exists
            let mut page = self
                .blocking(move |store| store.trail_page(&q, after, want + 1))
                .await?;
            let more = page.len() > want;
            page.truncate(want);
            after = page.last().map(|r| r.sequence_no);
            out.extend(page);

            if !more {
                break;
            }
            if out.len() >= limit {
                if request.limit.is_none() {
                    return Err(ServerError::Validation(format!(
                        "trail of {} exceeds {} records; page with from_sequence and limit",
                        query.chain_key, limit
                    )));
                }
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    chain_key = %query.chain_key,
                    fetched = out.len(),
                    timeout_ms = self.config.timeout_ms,
                    "Trail query deadline exceeded"
                );
                return Err(ServerError::PartialResult {
                    fetched: out.len(),
                    reason: format!("deadline of {}ms exceeded", self.config.timeout_ms),
                });
            }
        }

        debug!(chain_key = %query.chain_key, count = out.len(), "Trail served");
        Ok(out)
    }

    /// Point lookup
    pub async fn record(&self, record_id: Uuid) -> ServerResult<EventRecord> {
        self.blocking(move |store| store.get_record(&record_id)).await
    }

    /// Recompute hashes and linkage; every call is persisted as a run
    pub async fn verify(&self, target: VerifyTarget) -> ServerResult<VerificationReport> {
        if let VerifyTarget::Records(ids) = &target {
            if ids.is_empty() {
                return Err(ServerError::Validation("record_ids must not be empty".into()));
            }
            if ids.len() > self.config.max_trail_limit {
                return Err(ServerError::Validation(format!(
                    "at most {} record_ids per call",
                    self.config.max_trail_limit
                )));
            }
        }

        let started_at = Utc::now();
        let label = target.label();
        let deadline = self.deadline();
        let page_size = self.config.page_size.max(1);

        let report = match target.clone() {
            VerifyTarget::Chain(chain_key) => {
                let verification = self
                    .blocking(move |store| {
                        verify_chain_blocking(store, &chain_key, page_size, deadline)
                    })
                    .await?;
                VerificationReport {
                    valid: verification.valid,
                    first_invalid_record_id: verification.first_invalid_record_id,
                    checked_count: verification.checked_count,
                    error_message: verification.error_message,
                    results: Vec::new(),
                }
            }
            VerifyTarget::Records(ids) => {
                let results = self
                    .blocking(move |store| verify_records_blocking(store, &ids))
                    .await?;
                let first_invalid = results
                    .iter()
                    .find(|r| r.status != RecordStatus::Valid)
                    .map(|r| r.record_id);
                VerificationReport {
                    valid: first_invalid.is_none(),
                    first_invalid_record_id: first_invalid,
                    checked_count: results.len() as u64,
                    error_message: results
                        .iter()
                        .find(|r| r.status != RecordStatus::Valid)
                        .and_then(|r| r.reason.clone()),
                    results,
                }
            }
        };

        if !report.valid {
            self.raise_alerts(&target, &report);
        }

        let run = VerificationRun {
            target: label,
            valid: report.valid,
            checked_count: report.checked_count,
            first_invalid_record_id: report.first_invalid_record_id,
            started_at,
            finished_at: Utc::now(),
        };
        if let Err(e) = self.blocking(move |store| store.record_verification(&run)).await {
            warn!(error = %e, "Failed to persist verification run");
        }

        Ok(report)
    }

    pub async fn stats(&self) -> ServerResult<StoreStats> {
        self.blocking(|store| store.stats()).await
    }

    /// Most recently ingested records, newest first
    pub async fn list(&self, request: ListRequest) -> ServerResult<Vec<EventRecord>> {
        let limit = request.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if limit == 0 || limit > MAX_LIST_LIMIT {
            return Err(ServerError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }
        let filter = ListFilter {
            source: request.source,
            event_type: request.event_type,
            limit,
        };
        self.blocking(move |store| store.list_recent(&filter)).await
    }

    pub fn is_healthy(&self) -> bool {
        self.store.is_healthy()
    }

    fn deadline(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.config.timeout_ms)
    }

    fn raise_alerts(&self, target: &VerifyTarget, report: &VerificationReport) {
        let detected_at = Utc::now();
        match target {
            VerifyTarget::Chain(chain_key) => {
                let reason = report.error_message.clone().unwrap_or_default();
                error!(
                    chain_key = %chain_key,
                    record_id = ?report.first_invalid_record_id,
                    reason = %reason,
                    "Chain verification failed"
                );
                self.alerts.raise(IntegrityAlert {
                    origin: "verify".into(),
                    partition: None,
                    chain_key: Some(chain_key.clone()),
                    record_id: report.first_invalid_record_id,
                    reason,
                    detected_at,
                });
            }
            VerifyTarget::Records(_) => {
                for check in report
                    .results
                    .iter()
                    .filter(|r| r.status == RecordStatus::Tampered)
                {
                    let reason = check.reason.clone().unwrap_or_default();
                    error!(record_id = %check.record_id, reason = %reason, "Record verification failed");
                    self.alerts.raise(IntegrityAlert {
                        origin: "verify".into(),
                        partition: None,
                        chain_key: None,
                        record_id: Some(check.record_id),
                        reason,
                        detected_at,
                    });
                }
            }
        }
    }

    async fn blocking<T, F>(&self, f: F) -> ServerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore) -> ServerResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| ServerError::Internal(format!("spawn_blocking failed: {}", e)))?
    }
}

/// Walk a chain from its anchor up to the head read at the start
fn verify_chain_blocking(
    store: &dyn RecordStore,
    chain_key: &str,
    page_size: usize,
    deadline: Instant,
) -> ServerResult<ChainVerification> {
    let Some(head) = store.chain_head(chain_key)? else {
        return Err(ServerError::RecordNotFound(format!("chain {}", chain_key)));
    };
    let anchor = store.chain_anchor(chain_key)?;
    let query = TrailQuery {
        chain_key: chain_key.to_string(),
        to_sequence: Some(head.sequence_no),
        ..Default::default()
    };

    let mut expected_sequence = anchor.next_sequence;
    let mut expected_prev = anchor.prev_hash;
    let mut checked = 0u64;
    let mut after: Option<u64> = None;

    loop {
        let page = store.verify_page(&query, after, page_size + 1)?;
        let more = page.len() > page_size;
        for CheckedRecord {
            record,
            payload_fault,
        } in page.into_iter().take(page_size)
        {
            checked += 1;
            let outcome = match payload_fault {
                Some(fault) => Err(format!("payload copy unreadable: {}", fault)),
                None => verify_link(&record, expected_sequence, &expected_prev),
            };
            if let Err(reason) = outcome {
                return Ok(ChainVerification {
                    valid: false,
                    checked_count: checked,
                    first_invalid_record_id: Some(record.record_id),
                    error_message: Some(reason),
                });
            }
            expected_sequence = record.sequence_no + 1;
            expected_prev = record.content_hash;
            after = Some(record.sequence_no);
        }
        if !more {
            break;
        }
        if Instant::now() >= deadline {
            return Err(ServerError::PartialResult {
                fetched: checked as usize,
                reason: "verification deadline exceeded".into(),
            });
        }
    }

    // Missing tail records leave the durable head unreached
    if expected_sequence != head.sequence_no + 1 || expected_prev != head.content_hash {
        return Ok(ChainVerification {
            valid: false,
            checked_count: checked,
            first_invalid_record_id: None,
            error_message: Some(format!(
                "chain ends at sequence {} but head is at {}",
                expected_sequence as i64 - 1,
                head.sequence_no
            )),
        });
    }

    Ok(ChainVerification {
        valid: true,
        checked_count: checked,
        first_invalid_record_id: None,
        error_message: None,
    })
}

/// Check each record's hash and its link to the stored predecessor
fn verify_records_blocking(store: &dyn RecordStore, ids: &[Uuid]) -> ServerResult<Vec<RecordCheck>> {
    let mut results = Vec::with_capacity(ids.len());

    for id in ids {
        let (record, payload_fault) = match store.checked_record(id) {
            Ok(checked) => (checked.record, checked.payload_fault),
            Err(ServerError::RecordNotFound(_)) => {
                results.push(RecordCheck {
                    record_id: *id,
                    status: RecordStatus::NotFound,
                    stored_hash: None,
                    computed_hash: None,
                    reason: None,
                });
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Some(fault) = payload_fault {
            results.push(RecordCheck {
                record_id: *id,
                status: RecordStatus::Tampered,
                stored_hash: Some(hex::encode(record.content_hash)),
                computed_hash: None,
                reason: Some(format!("payload copy unreadable: {}", fault)),
            });
            continue;
        }

        let computed = recompute_hash(&record);
        let reason = if computed != record.content_hash {
            Some("content hash mismatch".to_string())
        } else {
            link_problem(store, &record)?
        };

        results.push(RecordCheck {
            record_id: *id,
            status: if reason.is_none() {
                RecordStatus::Valid
            } else {
                RecordStatus::Tampered
            },
            stored_hash: Some(hex::encode(record.content_hash)),
            computed_hash: Some(hex::encode(computed)),
            reason,
        });
    }

    Ok(results)
}

fn link_problem(store: &dyn RecordStore, record: &EventRecord) -> ServerResult<Option<String>> {
    let anchor = store.chain_anchor(&record.chain_key)?;
    let expected_prev = if record.sequence_no == anchor.next_sequence {
        Some(anchor.prev_hash)
    } else if record.sequence_no > anchor.next_sequence {
        store.content_hash_at(&record.chain_key, record.sequence_no - 1)?
    } else {
        None
    };

    Ok(match expected_prev {
        Some(prev) if prev == record.prev_hash => None,
        Some(_) => Some("prev_hash does not match stored predecessor".to_string()),
        None => Some(format!(
            "predecessor of sequence {} is missing",
            record.sequence_no
        )),
    })
}
