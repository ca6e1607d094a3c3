//! RequestCorrelator - synchronous request/reply over the bus.
//!
//! ```text
//! HTTP submit ──▶ subscribe(TOPIC_EVENT_RESPONSE)
//!                  │
//!                  ▼
//!               publish(TOPIC_EVENT_REQUEST, event)
//!                  │
//!                  ▼
//!               read replies until one carries event.id ──▶ reply
//!                  │
//!                  └── deadline elapsed ──▶ DeadlineExceeded
//! ```
//!
//! The response topic is shared by every pending request, so each waiter
//! reads (and discards) the replies addressed to everyone else.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{Event, EventId, ProjectId, TOPIC_EVENT_REQUEST, TOPIC_EVENT_RESPONSE};
use crate::ports::{PubSub, PubSubError, Subscription};

/// Default time a submitter waits for the matching reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a request did not produce a reply.
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    #[error("Failed to encode event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to subscribe for replies: {0}")]
    Subscribe(#[source] PubSubError),

    #[error("Failed to publish event: {0}")]
    Publish(#[source] PubSubError),

    #[error("No reply to event {event_id} within {timeout:?}")]
    DeadlineExceeded { event_id: EventId, timeout: Duration },

    #[error("Reply subscription ended before event {0} was answered")]
    SubscriptionEnded(EventId),
}

impl CorrelationError {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

/// Publishes events and waits for the reply carrying the same id.
pub struct RequestCorrelator {
    pub_sub: Arc<dyn PubSub>,
    reply_timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(pub_sub: Arc<dyn PubSub>, reply_timeout: Duration) -> Self {
        Self {
            pub_sub,
            reply_timeout,
        }
    }

    /// Create as an Arc (for sharing with HTTP state).
    pub fn new_shared(pub_sub: Arc<dyn PubSub>, reply_timeout: Duration) -> Arc<Self> {
        Arc::new(Self::new(pub_sub, reply_timeout))
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Assign a fresh id to the submitted content and wait for its reply.
    pub async fn submit(
        &self,
        project_id: ProjectId,
        event_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<Event, CorrelationError> {
        self.request_reply(Event::new(project_id, event_type, data))
            .await
    }

    /// Publish `request` and return the first reply whose id matches.
    ///
    /// The reply subscription is opened before publishing and is always
    /// closed before returning.
    pub async fn request_reply(&self, request: Event) -> Result<Event, CorrelationError> {
        let payload = serde_json::to_vec(&request)?;
        let deadline = Instant::now() + self.reply_timeout;

        let mut replies = self
            .pub_sub
            .subscribe(TOPIC_EVENT_RESPONSE)
            .await
            .map_err(CorrelationError::Subscribe)?;

        let result = self
            .publish_and_wait(&request, &payload, replies.as_mut(), deadline)
            .await;
        replies.close().await;

        match &result {
            Ok(_) => tracing::debug!(
                event_id = %request.id,
                project_id = %request.project_id,
                "Reply matched"
            ),
            Err(e) => tracing::warn!(
                event_id = %request.id,
                project_id = %request.project_id,
                error = %e,
                "Request did not complete"
            ),
        }
        result
    }

    async fn publish_and_wait(
        &self,
        request: &Event,
        payload: &[u8],
        replies: &mut dyn Subscription,
        deadline: Instant,
    ) -> Result<Event, CorrelationError> {
        self.pub_sub
            .publish(TOPIC_EVENT_REQUEST, payload)
            .await
            .map_err(CorrelationError::Publish)?;

        loop {
            let next = match tokio::time::timeout_at(deadline, replies.next_payload()).await {
                Ok(next) => next,
                Err(_) => {
                    return Err(CorrelationError::DeadlineExceeded {
                        event_id: request.id.clone(),
                        timeout: self.reply_timeout,
                    })
                }
            };

            let Some(bytes) = next else {
                return Err(CorrelationError::SubscriptionEnded(request.id.clone()));
            };

            match serde_json::from_slice::<Event>(&bytes) {
                Ok(reply) if reply.id == request.id => return Ok(reply),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping undecodable reply");
                }
            }
        }
    }
}
