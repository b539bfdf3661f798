//! Query layer
//!
//! Trail, point, list, verify and stats reads across all tiers.

mod config;
mod report;
mod service;

pub use config::QueryConfig;
pub use report::{RecordCheck, RecordStatus, VerificationReport, VerifyTarget};
pub use service::{
    ListRequest, QueryService, TrailRequest, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT,
};
