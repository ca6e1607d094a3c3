//! HTTP adapter for event submission and WebSocket connections.
//!
//! Exposes the relay's HTTP surface:
//! - `GET /` - liveness check
//! - `POST /event/send` - synchronous request/reply through a connected socket
//! - `GET /event/ws` - WebSocket upgrade

mod dto;
mod handlers;
mod routes;

pub use dto::{ConnectParams, ErrorResponse, SendEventRequest};
pub use handlers::{health, send_event, EventApiError, EventAppState};
pub use routes::{event_routes, relay_router};
