//! Redis-backed distributed lock for multi-instance deployments.
//!
//! Uses a single key per claim:
//! 1. `SET key held NX PX ttl` acquires; a nil reply means someone else has it
//! 2. `SET key consumed XX KEEPTTL` releases without freeing the key, so a
//!    duplicate delivery inside the TTL is still rejected
//!
//! KEEPTTL needs Redis 6.0 or newer.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;

use crate::ports::{DistributedLock, LockError};

/// Redis lock adapter.
#[derive(Clone)]
pub struct RedisDistributedLock {
    conn: MultiplexedConnection,
    key_prefix: String,
    ttl: Duration,
}

impl RedisDistributedLock {
    /// Create a new Redis lock.
    pub fn new(conn: MultiplexedConnection, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn ttl_millis(&self) -> u64 {
        (self.ttl.as_millis() as u64).max(1)
    }
}

#[async_trait]
impl DistributedLock for RedisDistributedLock {
    async fn lock(&self, key: &str) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.redis_key(key))
            .arg("held")
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_millis())
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| LockError::Unavailable(e.to_string()))?;

        Ok(reply.is_some())
    }

    async fn unlock(&self, key: &str) -> Result<(), LockError> {
        let mut conn = self.conn.clone();

        // Nil reply when the key already expired
        let _: Option<String> = redis::cmd("SET")
            .arg(self.redis_key(key))
            .arg("consumed")
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| LockError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

impl std::fmt::Debug for RedisDistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisDistributedLock")
            .field("key_prefix", &self.key_prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
