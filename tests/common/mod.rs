//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure including:
//! - A file-backed ledger with every service wired up
//! - Event builders and raw database access for tampering
//! - Custom assertions for record and chain JSON

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;

// Re-export frequently used external types for convenience
pub use axum::body::Body;
pub use axum::http::{Request, StatusCode};
pub use std::sync::Arc;
pub use tower::ServiceExt;
