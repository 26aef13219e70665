//! Shared routing state
//!
//! [`RouterContext`] is built once at process start and handed to the
//! dispatcher and every role handler. Nothing here is a global.

use crate::clock::{Clock, SystemClock};
use crate::monitor::MessageMonitor;
use crate::permission::TaskPermissionArbiter;
use crate::persistence::{NullSink, PersistenceSink};
use crate::reconnection::ReconnectionTracker;
use crate::registry::ConnectionRegistry;
use crate::transport::{ConnectionId, Role, Transport};
use dataagent_core::{AgentConfig, IdentityCardinality};
use dataagent_protocol::{Message, NodeId, SchemaValidator, Validator};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Routing parameters taken from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSettings {
    /// NodeId stamped on messages the agent originates
    pub agent_id: NodeId,
    /// Reconnection window
    pub reconnection_timeout: Duration,
    /// Ids per node connection
    pub node_cardinality: IdentityCardinality,
    /// Sender ids per tasking connection
    pub tasking_cardinality: IdentityCardinality,
    /// Sender ids per operator connection
    pub operator_cardinality: IdentityCardinality,
}

impl RouterSettings {
    /// Cardinality configured for `role`
    pub fn cardinality(&self, role: Role) -> IdentityCardinality {
        match role {
            Role::Node => self.node_cardinality,
            Role::Tasking => self.tasking_cardinality,
            Role::Operator => self.operator_cardinality,
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for RouterSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            agent_id: config.authority_id.clone(),
            reconnection_timeout: config.reconnection_timeout(),
            node_cardinality: config.cardinality.node,
            tasking_cardinality: config.cardinality.tasking,
            operator_cardinality: config.cardinality.operator,
        }
    }
}

/// Live connections grouped by role
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: Mutex<BTreeMap<Role, BTreeSet<ConnectionId>>>,
}

impl PeerDirectory {
    /// Track `conn` under `role`
    pub fn add(&self, role: Role, conn: ConnectionId) {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(role)
            .or_default()
            .insert(conn);
    }

    /// Stop tracking `conn`, returning the role it was under
    pub fn remove(&self, conn: &ConnectionId) -> Option<Role> {
        let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        peers
            .iter_mut()
            .find_map(|(role, conns)| conns.remove(conn).then_some(*role))
    }

    /// Live connections for `role`
    pub fn connections(&self, role: Role) -> Vec<ConnectionId> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&role)
            .map(|conns| conns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live connections for `role`
    pub fn count(&self, role: Role) -> usize {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&role)
            .map_or(0, BTreeSet::len)
    }
}

/// Last accepted Registration per node, replayed to a reconnecting authority
#[derive(Debug, Default)]
pub struct RegistrationCache {
    entries: Mutex<BTreeMap<NodeId, Message>>,
}

impl RegistrationCache {
    /// Remember `message` as the latest registration of its sender
    pub fn store(&self, message: &Message) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message.node_id.clone(), message.clone());
    }

    /// Cached registrations ordered by NodeId
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of cached nodes
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State shared by every router
pub struct RouterContext {
    /// Configured parameters
    pub settings: RouterSettings,
    /// Node identity bindings
    pub registry: ConnectionRegistry,
    /// Reconnection window bookkeeping
    pub tracker: ReconnectionTracker,
    /// Authority / console control
    pub arbiter: TaskPermissionArbiter,
    /// Counters and latencies
    pub monitor: Arc<MessageMonitor>,
    /// Live connections per role
    pub peers: PeerDirectory,
    /// Registration replay cache
    pub registrations: RegistrationCache,
    /// Field-level validator
    pub validator: Arc<dyn Validator>,
    /// Storage collaborator
    pub persistence: Arc<dyn PersistenceSink>,
    /// Outbound transport
    pub transport: Arc<dyn Transport>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl RouterContext {
    /// Start building a context around `transport`
    pub fn builder(transport: Arc<dyn Transport>) -> RouterContextBuilder {
        RouterContextBuilder {
            settings: RouterSettings::default(),
            monitor: None,
            validator: Arc::new(SchemaValidator::new()),
            persistence: Arc::new(NullSink),
            transport,
            clock: Arc::new(SystemClock),
        }
    }

    /// Send through the transport and log the result. Failed sends are not retried.
    pub fn send(&self, conn: &ConnectionId, message: &Message) -> bool {
        let sent = self.transport.send(conn, message);
        if sent {
            debug!(conn = %conn, node_id = %message.node_id, kind = ?message.kind(), "message sent");
        } else {
            warn!(conn = %conn, node_id = %message.node_id, kind = ?message.kind(), "send failed");
        }
        sent
    }

    /// Bound now, or seen within the reconnection window
    pub fn is_known_node(&self, node_id: &str) -> bool {
        self.registry.lookup_connection(node_id).is_some()
            || self
                .tracker
                .is_recent(node_id, self.clock.now(), self.settings.reconnection_timeout)
    }
}

impl std::fmt::Debug for RouterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterContext")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("arbiter", &self.arbiter)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RouterContext`]
pub struct RouterContextBuilder {
    settings: RouterSettings,
    monitor: Option<Arc<MessageMonitor>>,
    validator: Arc<dyn Validator>,
    persistence: Arc<dyn PersistenceSink>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl RouterContextBuilder {
    /// Routing parameters
    pub fn settings(mut self, settings: RouterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share an existing monitor (e.g. one the persistence sink reports to)
    pub fn monitor(mut self, monitor: Arc<MessageMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Replace the default [`SchemaValidator`]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replace the default [`NullSink`]
    pub fn persistence(mut self, persistence: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = persistence;
        self
    }

    /// Replace the default [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Finish building
    pub fn build(self) -> Arc<RouterContext> {
        Arc::new(RouterContext {
            registry: ConnectionRegistry::with_cardinality(self.settings.node_cardinality),
            settings: self.settings,
            tracker: ReconnectionTracker::new(),
            arbiter: TaskPermissionArbiter::new(),
            monitor: self.monitor.unwrap_or_default(),
            peers: PeerDirectory::default(),
            registrations: RegistrationCache::default(),
            validator: self.validator,
            persistence: self.persistence,
            transport: self.transport,
            clock: self.clock,
        })
    }
}
