//! Outbound notifications: commit events and integrity alerts

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::traits::EventRecord;

/// Published after every successful commit
///
/// Carries no payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordCommitted {
    pub record_id: Uuid,
    pub chain_key: String,
    pub sequence_no: u64,
    pub event_type: String,
    pub ingested_at: DateTime<Utc>,
}

impl From<&EventRecord> for RecordCommitted {
    fn from(record: &EventRecord) -> Self {
        Self {
            record_id: record.record_id,
            chain_key: record.chain_key.clone(),
            sequence_no: record.sequence_no,
            event_type: record.event_type.clone(),
            ingested_at: record.ingested_at,
        }
    }
}

/// Downstream commit notification sink
///
/// Implementations must not block; delivery is best-effort.
pub trait CommitNotifier: Send + Sync + 'static {
    fn notify(&self, event: RecordCommitted);
}

/// Commit notifier backed by a tokio broadcast channel
///
/// Lagging receivers lose the oldest notifications; a send with no
/// receivers is dropped.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<RecordCommitted>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordCommitted> {
        self.tx.subscribe()
    }
}

impl CommitNotifier for BroadcastNotifier {
    fn notify(&self, event: RecordCommitted) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No commit subscribers, notification dropped");
        }
    }
}

/// Integrity problem requiring forensic review
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityAlert {
    /// Where the problem was found (`migration`, `verify`)
    pub origin: String,
    pub partition: Option<String>,
    pub chain_key: Option<String>,
    pub record_id: Option<Uuid>,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
}

/// Alerting channel for integrity violations
pub trait AlertSink: Send + Sync + 'static {
    fn raise(&self, alert: IntegrityAlert);
}

/// Alert sink that logs at error level
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn raise(&self, alert: IntegrityAlert) {
        tracing::error!(
            origin = %alert.origin,
            partition = ?alert.partition,
            chain_key = ?alert.chain_key,
            record_id = ?alert.record_id,
            reason = %alert.reason,
            "INTEGRITY VIOLATION"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordCommitted {
        RecordCommitted {
            record_id: Uuid::new_v4(),
            chain_key: "u1".into(),
            sequence_no: 0,
            event_type: "login".into(),
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn test_notify_without_subscribers_does_not_fail() {
        let notifier = BroadcastNotifier::new(4);
        notifier.notify(sample());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();
        let event = sample();

        notifier.notify(event.clone());

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_notification_has_no_payload_field() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("payload").is_none());
        assert_eq!(json["chain_key"], "u1");
    }
}
