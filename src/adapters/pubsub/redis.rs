//! Redis-backed pub/sub bus for multi-instance deployments.
//!
//! Publishing goes through a shared multiplexed connection. Redis puts a
//! connection in subscriber mode once it subscribes, so every subscription
//! gets a dedicated connection that is dropped on close.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::ports::{PubSub, PubSubError, Subscription};

/// Redis pub/sub adapter.
#[derive(Clone)]
pub struct RedisPubSub {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisPubSub {
    /// Create an adapter from an opened client and its multiplexed connection.
    pub fn new(client: redis::Client, conn: MultiplexedConnection) -> Self {
        Self { client, conn }
    }
}

#[async_trait]
impl PubSub for RedisPubSub {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PubSubError> {
        let mut conn = self.conn.clone();

        conn.publish::<_, _, ()>(topic, payload)
            .await
            .map_err(|e: redis::RedisError| PubSubError::Unavailable(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, PubSubError> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| PubSubError::Unavailable(e.to_string()))?;

        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| PubSubError::Unavailable(e.to_string()))?;

        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .boxed();

        Ok(Box::new(RedisSubscription {
            stream: Some(stream),
        }))
    }
}

impl std::fmt::Debug for RedisPubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPubSub").finish_non_exhaustive()
    }
}

struct RedisSubscription {
    stream: Option<BoxStream<'static, Vec<u8>>>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_payload(&mut self) -> Option<Vec<u8>> {
        let payload = self.stream.as_mut()?.next().await;
        if payload.is_none() {
            self.stream = None;
        }
        payload
    }

    async fn close(&mut self) {
        // Dropping the stream drops the dedicated connection, which ends
        // the subscription server-side.
        self.stream = None;
    }
}
