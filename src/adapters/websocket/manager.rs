//! Connection lifecycle management.
//!
//! Opening a connection registers its pump and starts a closer task. The
//! closer waits for the pump to leave `Active`, removes the pump's own
//! registry entry, then resolves the pump's close signal. Registry removal
//! therefore always happens before anyone waiting on the signal wakes up.

use std::sync::Arc;

use crate::domain::{ConnectionIdentity, ProjectId};
use crate::ports::{DistributedLock, PubSub};

use super::pump::{ConnectionPump, FrameSink, FrameStream};
use super::registry::ClientRegistry;

/// Creates pumps and ties their lifecycle to the registry.
pub struct ConnectionManager {
    registry: Arc<ClientRegistry>,
    pub_sub: Arc<dyn PubSub>,
    lock: Arc<dyn DistributedLock>,
}

impl ConnectionManager {
    pub fn new(pub_sub: Arc<dyn PubSub>, lock: Arc<dyn DistributedLock>) -> Self {
        Self {
            registry: Arc::new(ClientRegistry::new()),
            pub_sub,
            lock,
        }
    }

    /// Create as an Arc (for sharing with the HTTP state and subscriber loop).
    pub fn new_shared(pub_sub: Arc<dyn PubSub>, lock: Arc<dyn DistributedLock>) -> Arc<Self> {
        Arc::new(Self::new(pub_sub, lock))
    }

    /// Register a new `Active` pump for an accepted connection.
    pub fn open(
        &self,
        identity: ConnectionIdentity,
        sink: FrameSink,
        stream: FrameStream,
    ) -> Arc<ConnectionPump> {
        let pump = Arc::new(ConnectionPump::new(
            identity.clone(),
            sink,
            stream,
            self.pub_sub.clone(),
            self.lock.clone(),
        ));

        if let Some(replaced) = self.registry.register(&identity, pump.clone()) {
            tracing::info!(
                connection = %identity,
                replaced_instance = %replaced.instance_id(),
                "Connection id reused, previous connection no longer receives events"
            );
        }
        tracing::debug!(connection = %identity, "Connection opened");

        let registry = self.registry.clone();
        let closer = pump.clone();
        tokio::spawn(async move {
            closer.cancelled().await;
            registry.unregister_pump(&closer);
            closer.mark_closed();
            tracing::debug!(connection = %closer.identity(), "Connection closed");
        });

        pump
    }

    /// Pick the pump that should receive events for `project_id`.
    pub fn resolve(&self, project_id: &ProjectId) -> Option<Arc<ConnectionPump>> {
        self.registry.resolve_by_project(project_id)
    }

    /// Close the connection registered under `identity`.
    ///
    /// Returns `false` when nothing is registered there.
    pub fn evict(&self, identity: &ConnectionIdentity) -> bool {
        match self.registry.get(identity) {
            Some(pump) => {
                pump.cancel();
                true
            }
            None => false,
        }
    }

    /// Close every registered connection. Used on shutdown so upgraded
    /// sockets do not hold the HTTP server open.
    pub fn close_all(&self) -> usize {
        let pumps = self.registry.pumps();
        for pump in &pumps {
            pump.cancel();
        }
        if !pumps.is_empty() {
            tracing::info!(count = pumps.len(), "Closing all connections");
        }
        pumps.len()
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::lock::InMemoryDistributedLock;
    use crate::adapters::pubsub::InMemoryPubSub;
    use crate::adapters::websocket::pump::test_transport::{pair, Peer};
    use crate::domain::ConnectionId;
    use std::time::Duration;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(InMemoryPubSub::default()),
            Arc::new(InMemoryDistributedLock::default()),
        )
    }

    fn identity(project: &str, connection: &str) -> ConnectionIdentity {
        ConnectionIdentity::new(
            ProjectId::new(project).unwrap(),
            ConnectionId::new(connection).unwrap(),
        )
    }

    async fn open(manager: &ConnectionManager, id: &ConnectionIdentity) -> (Arc<ConnectionPump>, Peer) {
        let (sink, stream, peer) = pair();
        (manager.open(id.clone(), sink, stream), peer)
    }

    #[tokio::test]
    async fn open_registers_pump() {
        let manager = manager();
        let id = identity("p1", "c1");

        let (pump, _peer) = open(&manager, &id).await;

        let resolved = manager.resolve(&id.project_id).unwrap();
        assert!(Arc::ptr_eq(&resolved, &pump));
        assert_eq!(manager.connection_count(), 1);
    }

    #[tokio::test]
    async fn close_signal_resolves_after_registry_removal() {
        let manager = manager();
        let id = identity("p1", "c1");
        let (pump, _peer) = open(&manager, &id).await;
        let signal = pump.close_signal();

        pump.cancel();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("close signal never resolved");

        assert!(manager.registry().get(&id).is_none());
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn close_signal_stays_pending_while_active() {
        let manager = manager();
        let id = identity("p1", "c1");
        let (pump, _peer) = open(&manager, &id).await;

        let waited = tokio::time::timeout(Duration::from_millis(50), pump.close_signal().wait()).await;

        assert!(waited.is_err());
        assert!(manager.registry().get(&id).is_some());
    }

    #[tokio::test]
    async fn evict_closes_registered_pump() {
        let manager = manager();
        let id = identity("p1", "c1");
        let (pump, _peer) = open(&manager, &id).await;

        assert!(manager.evict(&id));
        pump.close_signal().wait().await;

        assert!(pump.is_closing());
        assert!(!manager.evict(&id));
    }

    #[tokio::test]
    async fn close_all_closes_every_connection() {
        let manager = manager();
        let (a, _peer_a) = open(&manager, &identity("p1", "c1")).await;
        let (b, _peer_b) = open(&manager, &identity("p2", "c1")).await;

        assert_eq!(manager.close_all(), 2);
        a.close_signal().wait().await;
        b.close_signal().wait().await;

        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.registry().project_count(), 0);
    }

    #[tokio::test]
    async fn replaced_pump_closing_keeps_new_registration() {
        let manager = manager();
        let id = identity("p1", "c1");
        let (old, _old_peer) = open(&manager, &id).await;
        let (new, _new_peer) = open(&manager, &id).await;

        old.cancel();
        old.close_signal().wait().await;

        let current = manager.registry().get(&id).unwrap();
        assert!(Arc::ptr_eq(&current, &new));
    }

    #[tokio::test]
    async fn read_failure_closes_connection() {
        let manager = manager();
        let id = identity("p1", "c1");
        let (pump, peer) = open(&manager, &id).await;
        drop(peer);

        pump.run_inbound_pump().await;
        pump.close_signal().wait().await;

        assert!(manager.resolve(&id.project_id).is_none());
    }
}
