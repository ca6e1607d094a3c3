//! Adapters - Implementations of port interfaces and the transport edges.
//!
//! Adapters connect the relay core to external systems:
//! - `pubsub` - Pub/sub bus implementations (in-memory, Redis)
//! - `lock` - Delivery claim implementations (in-memory, Redis)
//! - `websocket` - Browser connections, registry and subscriber loop
//! - `http` - Axum routes and server loop

pub mod http;
pub mod lock;
pub mod pubsub;
pub mod websocket;

pub use lock::{InMemoryDistributedLock, RedisDistributedLock};
pub use pubsub::{InMemoryPubSub, RedisPubSub};
pub use websocket::{ConnectionManager, InboundBridge};
