//! Data Transfer Objects (DTOs)

mod request;
mod response;

pub use request::{IngestRequest, ListParams, TombstoneRequest, TrailParams, VerifyRequest};
pub use response::{
    HealthResponse, HaltedPartitionDto, IngestResponse, RecordDto, ResumeResponse,
};
