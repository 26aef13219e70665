//! Router error types
//!
//! Protocol-level failures (unknown ids, schema errors, permission refusals)
//! are [`Outcome`](crate::Outcome) values, not errors. The types here cover
//! registry conflicts surfaced to handlers and the persistence backend.

use crate::transport::ConnectionId;
use dataagent_protocol::NodeId;
use thiserror::Error;

/// Identity binding conflicts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// NodeId is held by another live connection
    #[error("{node_id} already registered on connection {bound_to}")]
    Conflict {
        /// Contested identity
        node_id: NodeId,
        /// Connection currently holding it
        bound_to: ConnectionId,
    },

    /// Connection already carries a different NodeId and may only carry one
    #[error("connection {conn} already registered as {existing}; cannot also register {node_id}")]
    CardinalityExceeded {
        /// Connection attempting the binding
        conn: ConnectionId,
        /// Identity already bound to it
        existing: NodeId,
        /// Identity that was refused
        node_id: NodeId,
    },
}

/// Persistence backend errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Writer thread could not be started
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
