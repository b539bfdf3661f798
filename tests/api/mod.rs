//! API integration tests
//!
//! Tests for HTTP endpoints:
//! - POST /v1/events, GET /v1/events
//! - GET /v1/chains/:chain_key/trail, GET /v1/records/:id
//! - POST /v1/verify, GET /v1/stats, tombstones and partition resume
//! - GET /health

pub mod events_test;
pub mod health_test;
pub mod query_test;
