//! Per-connection duplex pump between one WebSocket and the bus.
//!
//! ```text
//!   subscriber loop ──deliver()──▶ claim (project:event id) ──▶ socket write
//!   socket read ──run_inbound_pump()──▶ publish to event response topic
//! ```
//!
//! # Lifecycle
//!
//! `Active` until a read/write failure, [`ConnectionPump::cancel`] or an
//! eviction moves it to `Closing`. The connection manager then removes the
//! pump from the registry and resolves its [`CloseSignal`], at which point
//! the pump is `Closed`. A closed pump is never reused.

use std::pin::Pin;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{ConnectionIdentity, Event, TOPIC_EVENT_RESPONSE};
use crate::ports::{ClaimOutcome, DistributedLock, PubSub};

/// Write half of a connection's transport.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Read half of a connection's transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, axum::Error>> + Send>>;

/// What happened to a single [`ConnectionPump::deliver`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The event was written to the socket.
    Written,
    /// Another delivery already claimed this event.
    Duplicate,
    /// Dropped without touching the socket (lock backend error, pump closing).
    Dropped,
    /// Serialization or socket write failed; the pump is now closing.
    Failed,
}

/// Resolves once, when the pump is closed and out of the registry.
pub struct CloseSignal(watch::Receiver<bool>);

impl CloseSignal {
    /// Wait for the pump to be fully closed.
    pub async fn wait(mut self) {
        // A dropped sender means the pump itself is gone
        let _ = self.0.wait_for(|closed| *closed).await;
    }

    /// Whether the pump already reached `Closed`.
    pub fn is_closed(&self) -> bool {
        *self.0.borrow()
    }
}

/// Owns one live WebSocket connection for its whole lifetime.
pub struct ConnectionPump {
    identity: ConnectionIdentity,
    instance_id: Uuid,
    writer: Mutex<Option<FrameSink>>,
    reader: Mutex<Option<FrameStream>>,
    cancel: CancellationToken,
    closed: watch::Sender<bool>,
    pub_sub: Arc<dyn PubSub>,
    lock: Arc<dyn DistributedLock>,
}

impl ConnectionPump {
    /// Create an `Active` pump over the given transport halves.
    pub fn new(
        identity: ConnectionIdentity,
        sink: FrameSink,
        stream: FrameStream,
        pub_sub: Arc<dyn PubSub>,
        lock: Arc<dyn DistributedLock>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            identity,
            instance_id: Uuid::new_v4(),
            writer: Mutex::new(Some(sink)),
            reader: Mutex::new(Some(stream)),
            cancel: CancellationToken::new(),
            closed,
            pub_sub,
            lock,
        }
    }

    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    /// Distinguishes two pumps registered under the same identity.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Hand an inbound event to this connection.
    ///
    /// The socket write is gated on a claim keyed by `project:event id`, so
    /// duplicate bus deliveries (on this or another instance) write at most
    /// once. Failures never propagate: a failed write closes this pump.
    pub async fn deliver(&self, event: &Event) -> DeliveryOutcome {
        if self.is_closing() {
            tracing::debug!(
                connection = %self.identity,
                event_id = %event.id,
                "Pump is closing, dropping event"
            );
            return DeliveryOutcome::Dropped;
        }

        let key = format!("{}:{}", self.identity.project_id, event.id);
        match self.lock.try_claim(&key).await {
            Ok(ClaimOutcome::Claimed) => {}
            Ok(ClaimOutcome::AlreadyClaimed) => {
                tracing::debug!(
                    connection = %self.identity,
                    event_id = %event.id,
                    "Event already delivered elsewhere"
                );
                return DeliveryOutcome::Duplicate;
            }
            Err(e) => {
                tracing::warn!(
                    connection = %self.identity,
                    event_id = %event.id,
                    error = %e,
                    "Delivery claim failed, dropping event"
                );
                return DeliveryOutcome::Dropped;
            }
        }

        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(
                    connection = %self.identity,
                    event_id = %event.id,
                    error = %e,
                    "Failed to serialize event"
                );
                self.cancel();
                return DeliveryOutcome::Failed;
            }
        };

        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return DeliveryOutcome::Dropped;
        };

        if let Err(e) = sink.send(Message::Text(json)).await {
            tracing::error!(
                connection = %self.identity,
                event_id = %event.id,
                error = %e,
                "Write to socket failed, closing connection"
            );
            self.cancel();
            return DeliveryOutcome::Failed;
        }

        DeliveryOutcome::Written
    }

    /// Forward every frame read from the socket to the event response topic.
    ///
    /// Runs until the socket fails, the client closes, or the pump is
    /// cancelled. Frames are published in the order they were read.
    /// Only the first call does anything; the read half is taken by it.
    pub async fn run_inbound_pump(&self) {
        let Some(mut reader) = self.reader.lock().await.take() else {
            tracing::warn!(connection = %self.identity, "Inbound pump already started");
            return;
        };

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = reader.next() => frame,
            };

            let payload = match frame {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(bytes))) => bytes,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Control frames are answered by the transport
                    continue;
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::debug!(connection = %self.identity, "Client sent close frame");
                    self.cancel();
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(connection = %self.identity, error = %e, "Read from socket failed");
                    self.cancel();
                    break;
                }
                None => {
                    tracing::debug!(connection = %self.identity, "Socket stream ended");
                    self.cancel();
                    break;
                }
            };

            if let Err(e) = self.pub_sub.publish(TOPIC_EVENT_RESPONSE, &payload).await {
                tracing::error!(
                    connection = %self.identity,
                    error = %e,
                    "Failed to publish socket frame"
                );
            }
        }
    }

    /// Move the pump to `Closing`. Safe to call any number of times.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the pump has left `Active`.
    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the pump leaves `Active`.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Handle that resolves once the pump is `Closed`.
    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal(self.closed.subscribe())
    }

    /// Mark the pump `Closed`. Called after registry removal.
    pub(crate) fn mark_closed(&self) {
        self.closed.send_replace(true);
    }

    /// Release the transport, sending a close frame if the socket is still up.
    pub async fn release(&self) {
        self.cancel();
        if let Some(mut sink) = self.writer.lock().await.take() {
            if let Err(e) = sink.close().await {
                tracing::trace!(connection = %self.identity, error = %e, "Close frame not sent");
            }
        }
        self.reader.lock().await.take();
    }
}

impl std::fmt::Debug for ConnectionPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPump")
            .field("identity", &self.identity)
            .field("instance_id", &self.instance_id)
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}
