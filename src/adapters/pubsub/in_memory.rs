//! In-memory pub/sub bus for tests and local single-instance runs.
//!
//! Each topic is a `tokio::sync::broadcast` channel, so every subscription
//! open on a topic receives every payload published after it subscribed.
//! Topics without subscribers are dropped on publish, and the publish
//! capture keeps only the most recent payloads.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, RwLock};

use crate::ports::{PubSub, PubSubError, Subscription};

/// In-memory pub/sub bus.
///
/// Features:
/// - Fan-out to every open subscription of a topic
/// - Bounded publish capture for assertions
/// - Forced disconnect of a topic's subscribers (to exercise restarts)
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryPubSub::default());
/// let mut sub = bus.subscribe("topic").await?;
/// bus.publish("topic", b"hello").await?;
/// assert_eq!(sub.next_payload().await, Some(b"hello".to_vec()));
/// ```
pub struct InMemoryPubSub {
    topics: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    published: RwLock<VecDeque<(String, Vec<u8>)>>,
    channel_capacity: usize,
    capture_limit: usize,
}

/// Payloads kept by the publish capture unless overridden.
pub const DEFAULT_CAPTURE_LIMIT: usize = 1024;

impl InMemoryPubSub {
    /// Create a bus with the given per-topic buffer size.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            published: RwLock::new(VecDeque::new()),
            channel_capacity,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Keep at most `limit` payloads in the publish capture. Zero disables it.
    pub fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    /// Create with default capacity (256 payloads).
    pub fn with_default_capacity() -> Self {
        Self::new(256)
    }

    // === Test Helpers ===

    /// Payloads published to `topic`, in publish order, among the most
    /// recent captured ones.
    pub async fn published_to(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published
            .read()
            .await
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Number of subscriptions currently open on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of topics holding a channel.
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    /// End every open subscription on `topic`, as if the bus connection dropped.
    pub async fn disconnect_subscribers(&self, topic: &str) {
        self.topics.write().await.remove(topic);
    }

    async fn capture(&self, topic: &str, payload: &[u8]) {
        if self.capture_limit == 0 {
            return;
        }
        let mut published = self.published.write().await;
        while published.len() >= self.capture_limit {
            published.pop_front();
        }
        published.push_back((topic.to_string(), payload.to_vec()));
    }

    async fn prune_if_unused(&self, topic: &str) {
        let mut topics = self.topics.write().await;
        if topics.get(topic).is_some_and(|tx| tx.receiver_count() == 0) {
            topics.remove(topic);
        }
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PubSubError> {
        self.capture(topic, payload).await;

        let tx = self.topics.read().await.get(topic).cloned();
        // No receivers is fine
        if let Some(tx) = tx {
            if tx.send(payload.to_vec()).is_err() {
                self.prune_if_unused(topic).await;
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, PubSubError> {
        // Subscribe under the write lock so pruning never orphans a receiver
        let rx = self
            .topics
            .write()
            .await
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe();
        Ok(Box::new(InMemorySubscription {
            topic: topic.to_string(),
            rx: Some(rx),
        }))
    }
}

struct InMemorySubscription {
    topic: String,
    rx: Option<broadcast::Receiver<Vec<u8>>>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next_payload(&mut self) -> Option<Vec<u8>> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "Subscriber lagged, payloads dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.rx = None;
    }
}
