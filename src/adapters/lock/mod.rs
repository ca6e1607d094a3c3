//! Distributed lock adapters.
//!
//! - `InMemoryDistributedLock` - process-local claims for tests
//! - `RedisDistributedLock` - `SET NX PX` claims shared by all instances

mod in_memory;
mod redis;

pub use self::redis::RedisDistributedLock;
pub use in_memory::InMemoryDistributedLock;
