//! Transport seam
//!
//! The router never touches sockets. It sees connections as opaque
//! [`ConnectionId`]s and hands outbound messages to a [`Transport`].

use dataagent_protocol::Message;
use std::fmt;
use std::sync::Arc;

/// Opaque per-connection identifier, unique for the connection's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Wrap an existing identifier
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// Which endpoint a connection arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Sensor clients
    Node,
    /// The tasking authority
    Tasking,
    /// Operator consoles
    Operator,
}

impl Role {
    /// Every role
    pub const ALL: [Role; 3] = [Role::Node, Role::Tasking, Role::Operator];

    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Node => "node",
            Role::Tasking => "tasking",
            Role::Operator => "operator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound half of the transport layer
pub trait Transport: Send + Sync {
    /// Send one message; returns whether the write succeeded. Never retried.
    fn send(&self, conn: &ConnectionId, message: &Message) -> bool;

    /// Transport-level view of whether `conn` is still up
    fn is_connected(&self, _conn: &ConnectionId) -> bool {
        true
    }

    /// Close `conn` from the gateway side
    fn disconnect(&self, _conn: &ConnectionId) {}
}
