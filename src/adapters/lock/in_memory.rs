//! In-memory distributed lock for tests and single-instance runs.
//!
//! Claims live on the tokio clock, so tests can move time forward with
//! `tokio::time::pause` / `advance`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ports::{DistributedLock, LockError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Held,
    Consumed,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: KeyState,
    expires_at: Instant,
}

/// In-memory keyed lock with dedup semantics.
///
/// A key is unavailable from `lock` until `ttl` after it was acquired,
/// whether or not it was unlocked in between.
pub struct InMemoryDistributedLock {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl InMemoryDistributedLock {
    /// Create a lock whose claims expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Number of keys not yet expired.
    pub async fn live_keys(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether `key` is currently held (acquired and not yet unlocked).
    pub async fn is_held(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .get(key)
            .map(|e| e.state == KeyState::Held && e.expires_at > now)
            .unwrap_or(false)
    }
}

impl Default for InMemoryDistributedLock {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl DistributedLock for InMemoryDistributedLock {
    async fn lock(&self, key: &str) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        // Drop expired claims so the map does not grow without bound
        entries.retain(|_, e| e.expires_at > now);

        if entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                state: KeyState::Held,
                expires_at: now + self.ttl,
            },
        );
        Ok(true)
    }

    async fn unlock(&self, key: &str) -> Result<(), LockError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(key) {
            if entry.expires_at > now {
                entry.state = KeyState::Consumed;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ClaimOutcome;
    use std::sync::Arc;

    #[tokio::test]
    async fn lock_denies_held_key() {
        let lock = InMemoryDistributedLock::default();

        assert!(lock.lock("k").await.unwrap());
        assert!(lock.is_held("k").await);
        assert!(!lock.lock("k").await.unwrap());
    }

    #[tokio::test]
    async fn unlocked_key_stays_consumed() {
        let lock = InMemoryDistributedLock::default();

        assert!(lock.lock("k").await.unwrap());
        lock.unlock("k").await.unwrap();

        assert!(!lock.is_held("k").await);
        assert!(!lock.lock("k").await.unwrap());
    }

    #[tokio::test]
    async fn unlock_of_unknown_key_is_noop() {
        let lock = InMemoryDistributedLock::default();
        lock.unlock("missing").await.unwrap();
        assert_eq!(lock.live_keys().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn key_becomes_available_after_ttl() {
        let lock = InMemoryDistributedLock::new(Duration::from_secs(5));
        assert!(lock.lock("k").await.unwrap());
        lock.unlock("k").await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!lock.lock("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(lock.lock("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn unlock_after_expiry_is_safe() {
        let lock = InMemoryDistributedLock::new(Duration::from_secs(1));
        assert!(lock.lock("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        lock.unlock("k").await.unwrap();

        assert_eq!(lock.live_keys().await, 0);
    }

    #[tokio::test]
    async fn concurrent_claims_have_single_winner() {
        let lock = Arc::new(InMemoryDistributedLock::default());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let lock = lock.clone();
                tokio::spawn(async move { lock.try_claim("p1:evt").await.unwrap() })
            })
            .collect();

        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap() == ClaimOutcome::Claimed {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }
}
