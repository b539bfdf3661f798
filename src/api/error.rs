//! API error response types

use crate::error::ServerError;
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error response body
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,

    /// Machine-readable error code
    pub code: String,

    /// Whether the error is recoverable (client can retry)
    pub recoverable: bool,

    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    fn details_for(error: &ServerError) -> Option<serde_json::Value> {
        match error {
            ServerError::PayloadTooLarge { size, max } => {
                Some(json!({ "size": size, "max": max }))
            }
            ServerError::LeaseTimeout {
                chain_key,
                waited_ms,
            } => Some(json!({ "chain_key": chain_key, "waited_ms": waited_ms })),
            ServerError::PartialResult { fetched, .. } => Some(json!({ "fetched": fetched })),
            _ => None,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "Request failed");
        } else {
            tracing::warn!(code = self.error_code(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.error_code().to_string(),
            recoverable: self.is_recoverable(),
            details: ErrorResponse::details_for(&self),
        };

        (status, Json(body)).into_response()
    }
}
