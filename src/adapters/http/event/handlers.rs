//! HTTP handlers for event submission.
//!
//! These handlers connect the axum routes to the request correlator and
//! translate its outcomes into HTTP status codes.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRef, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::adapters::websocket::ConnectionManager;
use crate::application::{CorrelationError, RequestCorrelator};
use crate::domain::{Event, ProjectId, ValidationError};

use super::dto::{ErrorResponse, SendEventRequest};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the event endpoints.
#[derive(Clone)]
pub struct EventAppState {
    pub correlator: Arc<RequestCorrelator>,
    pub connections: Arc<ConnectionManager>,
}

impl EventAppState {
    pub fn new(correlator: Arc<RequestCorrelator>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            correlator,
            connections,
        }
    }
}

impl FromRef<EventAppState> for Arc<RequestCorrelator> {
    fn from_ref(state: &EventAppState) -> Self {
        state.correlator.clone()
    }
}

impl FromRef<EventAppState> for Arc<ConnectionManager> {
    fn from_ref(state: &EventAppState) -> Self {
        state.connections.clone()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET / - Liveness check
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// POST /event/send - Publish an event and wait for the socket's reply
///
/// The body is decoded as JSON whatever `Content-Type` the client sent.
pub async fn send_event(
    State(correlator): State<Arc<RequestCorrelator>>,
    body: Bytes,
) -> Result<Json<Event>, EventApiError> {
    let request: SendEventRequest = serde_json::from_slice(&body)?;
    let project_id = ProjectId::new(request.project_id.unwrap_or_default())?;

    let reply = correlator
        .submit(project_id, request.event_type, request.data)
        .await?;

    Ok(Json(reply))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts failures to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum EventApiError {
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Expected a WebSocket upgrade request")]
    UpgradeRequired,

    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

impl From<serde_json::Error> for EventApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidBody(err.to_string())
    }
}

impl IntoResponse for EventApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code) = match &self {
            EventApiError::InvalidBody(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            EventApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            EventApiError::UpgradeRequired => (StatusCode::BAD_REQUEST, "UPGRADE_REQUIRED"),
            EventApiError::Correlation(e) if e.is_deadline_exceeded() => {
                (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED")
            }
            EventApiError::Correlation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Event request failed");
        }

        let body = ErrorResponse::new(error_code, self.to_string());
        (status, Json(body)).into_response()
    }
}
