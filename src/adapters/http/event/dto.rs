//! HTTP DTOs for the event endpoints.
//!
//! Successful submissions answer with the matched reply [`Event`] as-is,
//! so only the request and error bodies have their own types here.
//!
//! [`Event`]: crate::domain::Event

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /event/send`.
///
/// `project_id` is optional at the JSON level so a missing value is
/// reported as a validation failure instead of a decoding failure.
#[derive(Debug, Clone, Deserialize)]
pub struct SendEventRequest {
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(rename = "type", default)]
    pub event_type: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

/// Query string of `GET /event/ws`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub project_id: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response DTO
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
