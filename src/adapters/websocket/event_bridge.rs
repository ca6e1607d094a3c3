//! Event bridge connecting the request topic to local WebSocket clients.
//!
//! # Event Flow
//!
//! ```text
//! Event published on TOPIC_EVENT_REQUEST (any instance)
//!          │
//!          ▼
//! ┌────────────────────┐
//! │  InboundBridge     │
//! │  receives payload  │
//! └────────────────────┘
//!          │ deserialize (skip on failure)
//!          ▼
//! ┌────────────────────┐
//! │  Resolve pump by   │
//! │  project_id        │──▶ none: not addressed to this instance
//! └────────────────────┘
//!          │
//!          ▼
//! ┌────────────────────┐
//! │  pump.deliver()    │  (own task per event)
//! └────────────────────┘
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{Event, TOPIC_EVENT_REQUEST};
use crate::ports::{PubSub, PubSubError};

use super::manager::ConnectionManager;
use super::pump::DeliveryOutcome;

/// Why a bridge run ended.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to subscribe to '{topic}': {source}")]
    Subscribe {
        topic: &'static str,
        #[source]
        source: PubSubError,
    },

    #[error("Subscription to '{0}' ended")]
    SubscriptionEnded(&'static str),
}

/// What the bridge did with one bus payload.
#[derive(Debug)]
pub enum RouteOutcome {
    /// Handed to a local pump; the handle yields the delivery result.
    Dispatched(JoinHandle<DeliveryOutcome>),
    /// No local connection for the event's project.
    NoConnection,
    /// Payload was not an event.
    Undecodable,
}

/// Drains the request topic and routes each event to its local pump.
///
/// One bridge runs per process, under the task supervisor.
pub struct InboundBridge {
    pub_sub: Arc<dyn PubSub>,
    connections: Arc<ConnectionManager>,
}

impl InboundBridge {
    pub fn new(pub_sub: Arc<dyn PubSub>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            pub_sub,
            connections,
        }
    }

    /// Create as an Arc (for restarting from the supervisor).
    pub fn new_shared(pub_sub: Arc<dyn PubSub>, connections: Arc<ConnectionManager>) -> Arc<Self> {
        Arc::new(Self::new(pub_sub, connections))
    }

    /// Subscribe once and route until shutdown.
    ///
    /// Returns `Ok(())` only on shutdown. A subscription that ends on its
    /// own is an error so the supervisor opens a fresh one.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), BridgeError> {
        let mut requests = self
            .pub_sub
            .subscribe(TOPIC_EVENT_REQUEST)
            .await
            .map_err(|source| BridgeError::Subscribe {
                topic: TOPIC_EVENT_REQUEST,
                source,
            })?;

        tracing::info!(topic = TOPIC_EVENT_REQUEST, "Inbound bridge subscribed");

        loop {
            let payload = tokio::select! {
                _ = shutdown.cancelled() => {
                    requests.close().await;
                    return Ok(());
                }
                payload = requests.next_payload() => payload,
            };

            match payload {
                Some(payload) => {
                    self.route(&payload).await;
                }
                None => return Err(BridgeError::SubscriptionEnded(TOPIC_EVENT_REQUEST)),
            }
        }
    }

    /// Route a single bus payload.
    ///
    /// Delivery runs on its own task so a stalled lock backend holds up
    /// only that one event.
    pub async fn route(&self, payload: &[u8]) -> RouteOutcome {
        let event: Event = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to deserialize event request, skipping");
                return RouteOutcome::Undecodable;
            }
        };

        let Some(pump) = self.connections.resolve(&event.project_id) else {
            tracing::trace!(
                project_id = %event.project_id,
                event_id = %event.id,
                "No local connection for project"
            );
            return RouteOutcome::NoConnection;
        };

        RouteOutcome::Dispatched(tokio::spawn(async move { pump.deliver(&event).await }))
    }
}
