//! Axum router configuration for the relay endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::ws_handler;

use super::handlers::{health, send_event, EventAppState};

/// Create the event API router.
///
/// # Routes
/// - `POST /send` - Publish an event and wait for its reply
/// - `GET /ws` - WebSocket upgrade for browser connections
pub fn event_routes() -> Router<EventAppState> {
    Router::new()
        .route("/send", post(send_event))
        .route("/ws", get(ws_handler))
}

/// Create the complete relay router.
///
/// # Routes
/// - `GET /` - Liveness check
/// - `/event/*` - See [`event_routes`]
pub fn relay_router(state: EventAppState) -> Router {
    Router::new()
        .route("/", get(health))
        .nest("/event", event_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
