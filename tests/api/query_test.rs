//! Trail, record, verify, stats, tombstone and partition endpoint tests

use crate::common::*;
use serde_json::json;

#[tokio::test]
async fn test_trail_is_ordered_and_linked() {
    let ledger = TestLedger::new();
    for key in ["e1", "e2", "e3"] {
        ledger.ingest("u1", key, key.as_bytes()).await;
    }
    ledger.ingest("u2", "other", b"x").await;

    let (status, trail) = send_json(&ledger.router(), "GET", "/v1/chains/u1/trail", None).await;
    assert_eq!(status, StatusCode::OK);
    let trail = trail.as_array().unwrap();
    assert_eq!(trail.len(), 3);
    assert_linked_trail(trail, 0);
    assert_eq!(trail[0]["idempotency_key"], "e1");
}

#[tokio::test]
async fn test_trail_sequence_range_and_limit() {
    let ledger = TestLedger::new();
    for i in 0..6 {
        ledger.ingest("u1", &format!("e{}", i), b"x").await;
    }
    let router = ledger.router();

    let (_, range) = send_json(
        &router,
        "GET",
        "/v1/chains/u1/trail?from_sequence=2&to_sequence=4",
        None,
    )
    .await;
    let range = range.as_array().unwrap();
    assert_eq!(range.len(), 3);
    assert_linked_trail(range, 2);

    let (_, limited) = send_json(&router, "GET", "/v1/chains/u1/trail?limit=2", None).await;
    assert_eq!(limited.as_array().unwrap().len(), 2);

    let (status, _) = send_json(&router, "GET", "/v1/chains/u1/trail?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_chain_and_record_set() {
    let ledger = TestLedger::new();
    let e1 = ledger.ingest("u1", "e1", b"one").await;
    let e2 = ledger.ingest("u1", "e2", b"two").await;
    let router = ledger.router();

    let (status, report) =
        send_json(&router, "POST", "/v1/verify", Some(json!({"chain_key": "u1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["valid"], true);
    assert_eq!(report["checked_count"], 2);
    assert!(report["first_invalid_record_id"].is_null());

    ledger.flip_payload_byte(e2.record_id);
    let missing = uuid::Uuid::new_v4();
    let (_, report) = send_json(
        &router,
        "POST",
        "/v1/verify",
        Some(json!({"record_ids": [e1.record_id, e2.record_id, missing]})),
    )
    .await;
    assert_eq!(report["valid"], false);
    assert_eq!(report["first_invalid_record_id"], e2.record_id.to_string());
    let results = report["results"].as_array().unwrap();
    assert_eq!(results[0]["status"], "VALID");
    assert_eq!(results[1]["status"], "TAMPERED");
    assert_eq!(results[2]["status"], "NOT_FOUND");

    let (status, _) = send_json(&router, "POST", "/v1/verify", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_after_ingest() {
    let ledger = TestLedger::new();
    ledger.ingest("u1", "e1", b"one").await;
    ledger.ingest("billing:acct-1", "b1", b"invoice").await;

    let (status, stats) = send_json(&ledger.router(), "GET", "/v1/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_records"], 2);
    assert_eq!(stats["chain_count"], 2);
    assert!(stats["halted_partitions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_tombstone_appends_override() {
    let ledger = TestLedger::new();
    let target = ledger.ingest("u1", "e1", b"personal data").await;
    let router = ledger.router();
    let uri = format!("/v1/records/{}/tombstone", target.record_id);

    let (status, _) = send_json(&router, "POST", &uri, Some(json!({"reason": "", "requested_by": "dpo"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, tomb) = send_json(
        &router,
        "POST",
        &uri,
        Some(json!({"reason": "erasure request", "requested_by": "dpo"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_valid_record_structure(&tomb);
    assert_eq!(tomb["chain_key"], "u1");
    assert_eq!(tomb["sequence_no"], 1);

    // The target is untouched
    let (_, original) = send_json(
        &router,
        "GET",
        &format!("/v1/records/{}", target.record_id),
        None,
    )
    .await;
    assert_eq!(original["content_hash"], hex::encode(target.content_hash));

    let (_, report) =
        send_json(&router, "POST", "/v1/verify", Some(json!({"chain_key": "u1"}))).await;
    assert_eq!(report["valid"], true);
}

#[tokio::test]
async fn test_halted_partition_can_be_resumed() {
    let ledger = TestLedger::new();
    let record = ledger.ingest("u1", "e1", b"old").await;
    ledger.backdate(record.record_id, 40);
    ledger.flip_payload_byte(record.record_id);

    let report = ledger.tier_manager.sweep_once().await.unwrap();
    assert_eq!(report.halted.len(), 1);
    let router = ledger.router();

    let (_, halted) = send_json(&router, "GET", "/v1/partitions/halted", None).await;
    let halted = halted.as_array().unwrap();
    assert_eq!(halted.len(), 1);
    let partition = halted[0]["partition"].as_str().unwrap().to_string();

    let (_, stats) = send_json(&router, "GET", "/v1/stats", None).await;
    assert_eq!(stats["halted_partitions"][0], partition);

    let (status, resumed) = send_json(
        &router,
        "POST",
        &format!("/v1/partitions/{}/resume", partition),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["resumed"], true);

    let (_, halted) = send_json(&router, "GET", "/v1/partitions/halted", None).await;
    assert!(halted.as_array().unwrap().is_empty());
}
