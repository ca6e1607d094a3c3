//! HTTP adapters - the relay's REST and WebSocket surface.

pub mod event;
pub mod server;

// Re-export key types for convenience
pub use event::{relay_router, EventApiError, EventAppState};
pub use server::{bind_and_serve, serve};
