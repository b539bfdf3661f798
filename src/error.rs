//! Server error types

use axum::http::StatusCode;
use thiserror::Error;

/// Main server error type
#[derive(Debug, Error)]
pub enum ServerError {
    // ========== Record Errors ==========
    /// Record not found
    #[error("record not found: {0}")]
    RecordNotFound(String),

    // ========== Validation Errors ==========
    /// Event failed validation (missing or malformed field)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Payload exceeds the configured bound
    #[error("payload too large: {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid UUID format
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    // ========== Concurrency Errors ==========
    /// Per-chain lease could not be acquired in time
    #[error("lease timeout on chain {chain_key} after {waited_ms}ms")]
    LeaseTimeout { chain_key: String, waited_ms: u64 },

    // ========== Integrity Errors ==========
    /// Tier migration halted for this partition after an integrity failure
    #[error("partition halted: {0}")]
    PartitionHalted(String),

    // ========== Query Errors ==========
    /// Query deadline passed before the full result was read
    #[error("partial result: query timed out after {fetched} records ({reason})")]
    PartialResult { fetched: usize, reason: String },

    // ========== Storage Errors ==========
    /// Storage operation failed (NOT NotFound - that becomes RecordNotFound)
    #[error("storage error: {0}")]
    Storage(StorageError),

    // ========== Server Errors ==========
    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Data corruption detected
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Durable chain head moved under the writer
    #[error("chain conflict on {chain_key}: expected next sequence {expected}, found {found}")]
    ChainConflict {
        chain_key: String,
        expected: u64,
        found: u64,
    },

    /// Segment file is malformed
    #[error("segment format error: {0}")]
    SegmentFormat(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl StorageError {
    /// Whether a retry of the same operation may succeed
    ///
    /// A missing or short payload file will not reappear on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::ConnectionFailed(_) => true,
            StorageError::Io(e) => !is_lost_file(e),
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Whether the error means a stored payload copy is gone or damaged
    pub fn is_payload_fault(&self) -> bool {
        match self {
            StorageError::Io(e) => is_lost_file(e),
            StorageError::Corruption(_) | StorageError::SegmentFormat(_) => true,
            _ => false,
        }
    }
}

fn is_lost_file(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::UnexpectedEof
    )
}

/// Server result type alias
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ServerError::Validation(_)
            | ServerError::InvalidArgument(_)
            | ServerError::InvalidUuid(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            ServerError::RecordNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            ServerError::PartitionHalted(_) => StatusCode::CONFLICT,

            // 413 Payload Too Large
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 503 Service Unavailable
            ServerError::LeaseTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Storage(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            ServerError::PartialResult { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            ServerError::Storage(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API response
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::RecordNotFound(_) => "RECORD_NOT_FOUND",
            ServerError::Validation(_) => "VALIDATION_ERROR",
            ServerError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ServerError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ServerError::InvalidUuid(_) => "INVALID_UUID",
            ServerError::LeaseTimeout { .. } => "LEASE_TIMEOUT",
            ServerError::PartitionHalted(_) => "PARTITION_HALTED",
            ServerError::PartialResult { .. } => "PARTIAL_RESULT",
            ServerError::Storage(_) => "STORAGE_ERROR",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if error is recoverable (client can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            ServerError::LeaseTimeout { .. } | ServerError::PartialResult { .. } => true,
            ServerError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

// Conversions from external errors

impl From<serde_json::Error> for ServerError {
    fn from(e: serde_json::Error) -> Self {
        ServerError::InvalidArgument(e.to_string())
    }
}

impl From<uuid::Error> for ServerError {
    fn from(e: uuid::Error) -> Self {
        ServerError::InvalidUuid(e.to_string())
    }
}

impl From<base64::DecodeError> for ServerError {
    fn from(e: base64::DecodeError) -> Self {
        ServerError::InvalidArgument(format!("base64 decode: {}", e))
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::Storage(StorageError::Sqlite(e))
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Storage(StorageError::Io(e))
    }
}

impl From<StorageError> for ServerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => ServerError::RecordNotFound(msg),
            other => ServerError::Storage(other),
        }
    }
}
