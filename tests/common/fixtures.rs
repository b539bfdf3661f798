//! Test fixtures and app setup utilities

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use ledger_store::api::{create_router, AppState};
use ledger_store::background::{TierManager, TierManagerConfig};
use ledger_store::ingest::{CandidateEvent, IngestConfig, IngestPipeline};
use ledger_store::query::{QueryConfig, QueryService};
use ledger_store::storage::{SqliteConfig, SqliteStore};
use ledger_store::traits::{
    AlertSink, BroadcastNotifier, EventRecord, IntegrityAlert, RecordStore, TierStore,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// Alert sink that keeps every alert for inspection
#[derive(Default)]
pub struct CollectingAlerts(Mutex<Vec<IntegrityAlert>>);

impl CollectingAlerts {
    pub fn all(&self) -> Vec<IntegrityAlert> {
        self.0.lock().unwrap().clone()
    }
}

impl AlertSink for CollectingAlerts {
    fn raise(&self, alert: IntegrityAlert) {
        self.0.lock().unwrap().push(alert);
    }
}

/// A file-backed ledger with pipeline, query service and tier manager
pub struct TestLedger {
    pub dir: TempDir,
    pub db_path: PathBuf,
    pub store: Arc<SqliteStore>,
    pub pipeline: Arc<IngestPipeline>,
    pub query: Arc<QueryService>,
    pub tier_manager: Arc<TierManager>,
    pub alerts: Arc<CollectingAlerts>,
}

impl TestLedger {
    pub fn new() -> Self {
        Self::with_tiers(TierManagerConfig::default())
    }

    pub fn with_tiers(tiers: TierManagerConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        Self::open(dir, tiers)
    }

    /// Open (or reopen) the ledger stored under `dir`
    pub fn open(dir: TempDir, tiers: TierManagerConfig) -> Self {
        let db_path = dir.path().join("ledger.db");
        let store = Arc::new(
            SqliteStore::with_config(SqliteConfig {
                path: db_path.to_string_lossy().into_owned(),
                data_dir: dir.path().join("raw-store"),
                ..Default::default()
            })
            .expect("Failed to open store"),
        );
        let alerts = Arc::new(CollectingAlerts::default());
        let pipeline = Arc::new(IngestPipeline::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::new(BroadcastNotifier::new(64)),
            IngestConfig::default(),
        ));
        let query = Arc::new(QueryService::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::clone(&alerts) as Arc<dyn AlertSink>,
            QueryConfig::default(),
        ));
        let tier_manager = Arc::new(TierManager::new(
            Arc::clone(&store) as Arc<dyn TierStore>,
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::clone(&pipeline),
            Arc::clone(&alerts) as Arc<dyn AlertSink>,
            tiers,
        ));

        Self {
            dir,
            db_path,
            store,
            pipeline,
            query,
            tier_manager,
            alerts,
        }
    }

    /// Drop every service and reopen from disk
    pub fn reopen(self) -> Self {
        let Self { dir, .. } = self;
        Self::open(dir, TierManagerConfig::default())
    }

    pub fn router(&self) -> Router {
        create_router(Arc::new(AppState::new(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.query),
            Arc::clone(&self.tier_manager),
        )))
    }

    /// A second connection to the database file, bypassing the store
    pub fn raw_conn(&self) -> rusqlite::Connection {
        let conn = rusqlite::Connection::open(&self.db_path).expect("Failed to open raw connection");
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .expect("Failed to set busy timeout");
        conn
    }

    pub async fn ingest(&self, chain_key: &str, key: &str, payload: &[u8]) -> EventRecord {
        self.pipeline
            .ingest(event(chain_key, key, payload))
            .await
            .expect("ingest failed")
            .record
    }

    /// Flip the first byte of a record's inline payload
    pub fn flip_payload_byte(&self, record_id: Uuid) {
        let conn = self.raw_conn();
        let mut payload: Vec<u8> = conn
            .query_row(
                "SELECT payload FROM records WHERE record_id = ?1",
                rusqlite::params![record_id.to_string()],
                |row| row.get(0),
            )
            .expect("record has no inline payload");
        payload[0] ^= 0x01;
        conn.execute(
            "UPDATE records SET payload = ?1 WHERE record_id = ?2",
            rusqlite::params![payload, record_id.to_string()],
        )
        .expect("tamper failed");
    }

    /// Move a record's ingestion time (and partition date) into the past
    pub fn backdate(&self, record_id: Uuid, days: i64) {
        let at: DateTime<Utc> = Utc::now() - Duration::days(days);
        self.raw_conn()
            .execute(
                "UPDATE records SET ingested_at = ?1, partition_date = ?2 WHERE record_id = ?3",
                rusqlite::params![
                    at.timestamp_nanos_opt().unwrap_or(0),
                    at.format("%Y-%m-%d").to_string(),
                    record_id.to_string()
                ],
            )
            .expect("backdate failed");
    }

    /// Segment file holding a relocated record's payload
    pub fn segment_path(&self, record_id: Uuid) -> PathBuf {
        self.segment_location(record_id).0
    }

    /// Flip the first payload byte inside a warm or cold segment file
    pub fn flip_segment_byte(&self, record_id: Uuid) {
        let (path, offset) = self.segment_location(record_id);
        let mut bytes = std::fs::read(&path).expect("segment unreadable");
        bytes[offset as usize] ^= 0x01;
        std::fs::write(&path, bytes).expect("segment rewrite failed");
    }

    fn segment_location(&self, record_id: Uuid) -> (PathBuf, u64) {
        let (rel_path, offset): (String, i64) = self
            .raw_conn()
            .query_row(
                "SELECT s.path, r.segment_offset
                 FROM records r JOIN segments s ON s.segment_id = r.segment_id
                 WHERE r.record_id = ?1",
                rusqlite::params![record_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("record has no segment copy");
        (self.dir.path().join("raw-store").join(rel_path), offset as u64)
    }
}

pub fn event(chain_key: &str, key: &str, payload: &[u8]) -> CandidateEvent {
    CandidateEvent {
        idempotency_key: key.to_string(),
        event_type: "login".to_string(),
        event_subtype: None,
        source: "identity-engine".to_string(),
        chain_key: Some(chain_key.to_string()),
        occurred_at: Utc::now(),
        payload: payload.to_vec(),
    }
}

/// Send a request through the router and decode the JSON body
pub async fn send_json(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
