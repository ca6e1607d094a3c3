//! Event Relay - routes project events between HTTP callers and WebSocket
//! clients across a horizontally scaled set of instances.
//!
//! Any instance accepts `POST /event/send`; the event travels over the
//! shared pub/sub bus to whichever instance holds the project's live
//! socket, and the socket's reply travels back the same way.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
