//! WebSocket adapters - delivering bus events to browser connections.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Pub/Sub Bus                                  │
//! │   InMemoryPubSub (test) │ RedisPubSub (production)                  │
//! └─────────────────────────────────────────────────────────────────────┘
//!            │ TOPIC_EVENT_REQUEST                 ▲ TOPIC_EVENT_RESPONSE
//!            ▼                                     │
//! ┌──────────────────────────┐                     │
//! │      InboundBridge       │                     │
//! │  one per process         │                     │
//! └──────────────────────────┘                     │
//!            │ resolve(project_id)                 │
//!            ▼                                     │
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      ClientRegistry                                  │
//! │   Project: p1          Project: p2                                   │
//! │   ├── conn-a           └── conn-d                                    │
//! │   └── conn-b                                                         │
//! └─────────────────────────────────────────────────────────────────────┘
//!            │ deliver (claimed once)              │ inbound frames
//!            ▼                                     │
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                ConnectionPump  ◀──▶  browser socket                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`registry`] - Live pumps indexed by project and connection
//! - [`pump`] - Per-connection delivery, inbound forwarding and lifecycle
//! - [`manager`] - Opens pumps and ties their closure to the registry
//! - [`event_bridge`] - Subscriber loop routing bus events to pumps
//! - [`handler`] - Axum WebSocket upgrade handler

pub mod event_bridge;
pub mod handler;
pub mod manager;
pub mod pump;
pub mod registry;

pub use event_bridge::{BridgeError, InboundBridge, RouteOutcome};
pub use handler::{ws_handler, CONNECTION_ID_HEADER};
pub use manager::ConnectionManager;
pub use pump::{CloseSignal, ConnectionPump, DeliveryOutcome, FrameSink, FrameStream};
pub use registry::ClientRegistry;
