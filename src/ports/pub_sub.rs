//! PubSub port - Interface for the distributed publish/subscribe bus.
//!
//! The relay never assumes exclusive access to the bus: several backend
//! instances publish and subscribe to the same topics concurrently. A
//! payload published on a topic reaches every subscription open on that
//! topic at publish time, on every instance.

use async_trait::async_trait;

/// Errors surfaced by bus adapters.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// Bus backend could not be reached or rejected the command
    #[error("Pub/sub backend unavailable: {0}")]
    Unavailable(String),

    /// Subscription was already released
    #[error("Subscription closed")]
    Closed,
}

/// A live subscription to one topic.
///
/// Produces payloads lazily and without bound until the bus connection
/// drops or [`Subscription::close`] is called. A subscription cannot be
/// restarted; open a new one instead.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next payload.
    ///
    /// Returns `None` once the subscription has ended.
    async fn next_payload(&mut self) -> Option<Vec<u8>>;

    /// Stop delivery and release bus-side resources.
    ///
    /// Calling `close` more than once is harmless.
    async fn close(&mut self);
}

/// Port for publishing to and subscribing from named topics.
///
/// # Example
///
/// ```ignore
/// let mut replies = bus.subscribe(TOPIC_EVENT_RESPONSE).await?;
/// bus.publish(TOPIC_EVENT_REQUEST, &bytes).await?;
/// while let Some(payload) = replies.next_payload().await { /* ... */ }
/// replies.close().await;
/// ```
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Publish a payload to every current subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PubSubError>;

    /// Open a new subscription on `topic`.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, PubSubError>;
}
