//! Registry of live connection pumps, organized by project.
//!
//! # Architecture
//!
//! ```text
//! Project: p1            Project: p2
//! ├── conn-a (seq 1)     └── conn-d (seq 4)
//! └── conn-b (seq 3)  ◀── resolve(p1) picks the newest live pump
//! ```
//!
//! The registry only hands out references. No lock is held while a caller
//! uses the pump it got back, so a resolved pump may already be closing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::{ConnectionId, ConnectionIdentity, ProjectId};

use super::pump::ConnectionPump;

struct Registered {
    sequence: u64,
    pump: Arc<ConnectionPump>,
}

/// Tracks live pumps by `(project, connection)` identity.
///
/// # Tie-break
///
/// When a project has several connections, [`ClientRegistry::resolve_by_project`]
/// returns the most recently registered pump that is not closing.
///
/// # Thread Safety
///
/// Projects live in a sharded `DashMap`. A connect or disconnect only locks
/// the shard holding its project, so lookups for other projects proceed
/// concurrently. No shard guard is held across an `.await`.
pub struct ClientRegistry {
    projects: DashMap<ProjectId, HashMap<ConnectionId, Registered>>,
    next_sequence: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            projects: DashMap::new(),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Insert or overwrite the pump registered under `identity`.
    ///
    /// Returns the pump that was replaced, if any. The replaced pump keeps
    /// running; it just stops receiving routed events.
    pub fn register(
        &self,
        identity: &ConnectionIdentity,
        pump: Arc<ConnectionPump>,
    ) -> Option<Arc<ConnectionPump>> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);

        self.projects
            .entry(identity.project_id.clone())
            .or_default()
            .insert(identity.connection_id.clone(), Registered { sequence, pump })
            .map(|previous| previous.pump)
    }

    /// Some live pump registered under `project_id`, newest first.
    pub fn resolve_by_project(&self, project_id: &ProjectId) -> Option<Arc<ConnectionPump>> {
        let connections = self.projects.get(project_id)?;
        let newest = connections
            .values()
            .filter(|r| !r.pump.is_closing())
            .max_by_key(|r| r.sequence)
            .map(|r| r.pump.clone());
        newest
    }

    /// The pump registered under exactly this identity.
    pub fn get(&self, identity: &ConnectionIdentity) -> Option<Arc<ConnectionPump>> {
        let connections = self.projects.get(&identity.project_id)?;
        let pump = connections
            .get(&identity.connection_id)
            .map(|r| r.pump.clone());
        pump
    }

    /// Remove whatever is registered under `identity`. Idempotent.
    pub fn unregister(&self, identity: &ConnectionIdentity) -> Option<Arc<ConnectionPump>> {
        let removed = self
            .projects
            .get_mut(&identity.project_id)?
            .remove(&identity.connection_id);

        self.remove_if_empty(&identity.project_id);
        removed.map(|r| r.pump)
    }

    /// Remove `pump`'s entry only if it is still the one registered.
    ///
    /// A pump that was overwritten by a newer connection with the same
    /// identity must not evict its replacement when it closes.
    pub fn unregister_pump(&self, pump: &ConnectionPump) -> bool {
        let identity = pump.identity();

        let Some(mut connections) = self.projects.get_mut(&identity.project_id) else {
            return false;
        };

        let is_current = connections
            .get(&identity.connection_id)
            .is_some_and(|r| r.pump.instance_id() == pump.instance_id());
        if is_current {
            connections.remove(&identity.connection_id);
        }
        drop(connections);

        if is_current {
            self.remove_if_empty(&identity.project_id);
        }
        is_current
    }

    /// Connection ids registered under `project_id`.
    pub fn connections_for(&self, project_id: &ProjectId) -> Vec<ConnectionId> {
        self.projects
            .get(project_id)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every registered pump.
    pub fn pumps(&self) -> Vec<Arc<ConnectionPump>> {
        self.projects
            .iter()
            .flat_map(|entry| {
                entry
                    .values()
                    .map(|r| r.pump.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Total registered connections across all projects.
    pub fn connection_count(&self) -> usize {
        self.projects.iter().map(|entry| entry.len()).sum()
    }

    /// Number of projects with at least one connection.
    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    // Runs under the shard write lock, so a concurrent register into the
    // same project either lands first (entry kept) or recreates it after.
    fn remove_if_empty(&self, project_id: &ProjectId) {
        self.projects
            .remove_if(project_id, |_, connections| connections.is_empty());
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
