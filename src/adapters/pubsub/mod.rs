//! Pub/sub bus adapters.
//!
//! - `InMemoryPubSub` - in-process fan-out for tests and single-instance runs
//! - `RedisPubSub` - Redis PUBLISH/SUBSCRIBE for multi-instance deployments

mod in_memory;
mod redis;

pub use self::redis::RedisPubSub;
pub use in_memory::InMemoryPubSub;
