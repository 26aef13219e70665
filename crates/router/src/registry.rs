//! Connection Registry
//!
//! Bidirectional binding between transport connections and node identities.
//! A NodeId is held by at most one live connection at a time; how many
//! NodeIds one connection may hold depends on the configured cardinality.
//!
//! All operations take a single lock, so the collision check and the binding
//! in [`ConnectionRegistry::register`] are atomic with respect to concurrent
//! registrations.

use crate::error::RegistryError;
use crate::transport::ConnectionId;
use dataagent_core::IdentityCardinality;
use dataagent_protocol::NodeId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct Bindings {
    by_node: HashMap<NodeId, ConnectionId>,
    by_conn: HashMap<ConnectionId, BTreeSet<NodeId>>,
}

/// Thread-safe NodeId ↔ ConnectionId map
#[derive(Debug)]
pub struct ConnectionRegistry {
    bindings: Mutex<Bindings>,
    cardinality: IdentityCardinality,
}

impl ConnectionRegistry {
    /// Registry allowing one NodeId per connection
    pub fn new() -> Self {
        Self::with_cardinality(IdentityCardinality::Single)
    }

    /// Registry with an explicit per-connection cardinality
    pub fn with_cardinality(cardinality: IdentityCardinality) -> Self {
        Self {
            bindings: Mutex::new(Bindings::default()),
            cardinality,
        }
    }

    /// Per-connection cardinality this registry enforces
    pub fn cardinality(&self) -> IdentityCardinality {
        self.cardinality
    }

    fn lock(&self) -> MutexGuard<'_, Bindings> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `node_id` to `conn`
    ///
    /// Re-registering an id on the connection that already holds it is a
    /// no-op. Fails with [`RegistryError::Conflict`] if another connection
    /// holds the id, and with [`RegistryError::CardinalityExceeded`] if the
    /// connection may carry a single id and already carries a different one.
    pub fn register(&self, conn: &ConnectionId, node_id: &str) -> Result<(), RegistryError> {
        let mut bindings = self.lock();

        if let Some(bound_to) = bindings.by_node.get(node_id) {
            if bound_to == conn {
                return Ok(());
            }
            return Err(RegistryError::Conflict {
                node_id: node_id.to_string(),
                bound_to: bound_to.clone(),
            });
        }

        if self.cardinality == IdentityCardinality::Single {
            if let Some(existing) = bindings.by_conn.get(conn).and_then(|ids| ids.iter().next()) {
                return Err(RegistryError::CardinalityExceeded {
                    conn: conn.clone(),
                    existing: existing.clone(),
                    node_id: node_id.to_string(),
                });
            }
        }

        bindings.by_node.insert(node_id.to_string(), conn.clone());
        bindings
            .by_conn
            .entry(conn.clone())
            .or_default()
            .insert(node_id.to_string());
        debug!(conn = %conn, node_id, "node bound to connection");
        Ok(())
    }

    /// Connection currently holding `node_id`
    pub fn lookup_connection(&self, node_id: &str) -> Option<ConnectionId> {
        self.lock().by_node.get(node_id).cloned()
    }

    /// NodeIds bound to `conn`
    pub fn node_ids_for(&self, conn: &ConnectionId) -> BTreeSet<NodeId> {
        self.lock().by_conn.get(conn).cloned().unwrap_or_default()
    }

    /// Drop every binding held by `conn`, returning the released ids
    pub fn remove(&self, conn: &ConnectionId) -> BTreeSet<NodeId> {
        let mut bindings = self.lock();
        let released = bindings.by_conn.remove(conn).unwrap_or_default();
        for node_id in &released {
            bindings.by_node.remove(node_id);
        }
        if !released.is_empty() {
            debug!(conn = %conn, released = released.len(), "connection bindings removed");
        }
        released
    }

    /// Number of bound NodeIds
    pub fn node_count(&self) -> usize {
        self.lock().by_node.len()
    }

    /// Number of connections holding at least one NodeId
    pub fn connection_count(&self) -> usize {
        self.lock().by_conn.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
