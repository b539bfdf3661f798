//! Health endpoint tests

use crate::common::*;

#[tokio::test]
async fn test_health_reports_version_and_storage() {
    let ledger = TestLedger::new();
    let (status, json) = send_json(&ledger.router(), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["storage_healthy"], true);
    assert!(json["uptime_secs"].is_u64());
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn test_health_is_not_under_v1() {
    let ledger = TestLedger::new();
    let (status, _) = send_json(&ledger.router(), "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
