//! Ingestion endpoint tests

use crate::common::*;
use base64::Engine;
use serde_json::json;

fn body(key: &str) -> serde_json::Value {
    json!({
        "idempotency_key": key,
        "event_type": "login",
        "event_subtype": "password",
        "source": "identity-engine",
        "chain_key": "u1",
        "occurred_at": "2026-03-01T12:00:00Z",
        "payload": base64::engine::general_purpose::STANDARD.encode(b"{\"ip\":\"10.0.0.1\"}"),
    })
}

#[tokio::test]
async fn test_ingest_returns_created_record() {
    let ledger = TestLedger::new();
    let (status, json) = send_json(&ledger.router(), "POST", "/v1/events", Some(body("e1"))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["duplicate"], false);
    let record = &json["record"];
    assert_valid_record_structure(record);
    assert_eq!(record["chain_key"], "u1");
    assert_eq!(record["sequence_no"], 0);
    assert_eq!(record["event_subtype"], "password");
    assert_eq!(record["partition"].as_str().unwrap().split('/').next(), Some("default"));
    assert!(record["occurred_at"].as_str().unwrap().starts_with("2026-03-01T12:00:00"));
}

#[tokio::test]
async fn test_duplicate_delivery_returns_original() {
    let ledger = TestLedger::new();
    let router = ledger.router();

    let (_, first) = send_json(&router, "POST", "/v1/events", Some(body("e1"))).await;
    let (status, second) = send_json(&router, "POST", "/v1/events", Some(body("e1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["duplicate"], true);
    assert_eq!(second["record"]["record_id"], first["record"]["record_id"]);

    let (_, trail) = send_json(&router, "GET", "/v1/chains/u1/trail", None).await;
    assert_eq!(trail.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_default_chain_key_from_source_and_type() {
    let ledger = TestLedger::new();
    let mut req = body("e1");
    req.as_object_mut().unwrap().remove("chain_key");

    let (status, json) = send_json(&ledger.router(), "POST", "/v1/events", Some(req)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["record"]["chain_key"], "identity-engine:login");
    assert_eq!(
        json["record"]["partition"].as_str().unwrap().split('/').next(),
        Some("identity-engine")
    );
}

#[tokio::test]
async fn test_rejects_malformed_events() {
    let ledger = TestLedger::new();
    let router = ledger.router();

    let mut missing_type = body("e1");
    missing_type["event_type"] = json!("");
    let (status, json) = send_json(&router, "POST", "/v1/events", Some(missing_type)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["recoverable"], false);

    let mut both_payloads = body("e2");
    both_payloads["payload_json"] = json!({"a": 1});
    let (status, _) = send_json(&router, "POST", "/v1/events", Some(both_payloads)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(&router, "POST", "/v1/events", Some(json!("not an object"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, trail) = send_json(&router, "GET", "/v1/chains/u1/trail", None).await;
    assert!(trail.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_payload_is_413() {
    let ledger = TestLedger::new();
    let mut req = body("big");
    let max = ledger.pipeline.config().max_payload_bytes;
    req["payload"] = json!(base64::engine::general_purpose::STANDARD.encode(vec![b'x'; max + 1]));

    let (status, json) = send_json(&ledger.router(), "POST", "/v1/events", Some(req)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_list_recent_events_filters_by_source() {
    let ledger = TestLedger::new();
    let router = ledger.router();
    send_json(&router, "POST", "/v1/events", Some(body("e1"))).await;
    let mut other = body("e2");
    other["source"] = json!("billing-engine");
    send_json(&router, "POST", "/v1/events", Some(other)).await;

    let (status, all) = send_json(&router, "GET", "/v1/events?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    let all = all.as_array().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["idempotency_key"], "e2");

    let (_, filtered) = send_json(&router, "GET", "/v1/events?source=billing-engine", None).await;
    assert_eq!(filtered.as_array().unwrap().len(), 1);
}
