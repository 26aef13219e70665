//! Task permission arbitration
//!
//! Decides who may task a node. The tasking authority holds control of every
//! node by default; an operator console can take manual control of specific
//! nodes and later hand it back.

use dataagent_protocol::NodeId;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Set of nodes currently under console control
#[derive(Debug, Default)]
pub struct TaskPermissionArbiter {
    console_controlled: Mutex<HashSet<NodeId>>,
}

impl TaskPermissionArbiter {
    /// Arbiter with every node under authority control
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<NodeId>> {
        self.console_controlled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Give the operator console control of `node_id`
    ///
    /// Returns false if the console already held it.
    pub fn take_control(&self, node_id: &str) -> bool {
        let changed = self.lock().insert(node_id.to_string());
        if changed {
            info!(node_id, "operator console took control");
        } else {
            debug!(node_id, "operator console already in control");
        }
        changed
    }

    /// Return control of `node_id` to the tasking authority
    ///
    /// Returns false if the authority already held it.
    pub fn release_control(&self, node_id: &str) -> bool {
        let changed = self.lock().remove(node_id);
        if changed {
            info!(node_id, "operator console released control");
        } else {
            debug!(node_id, "control already with tasking authority");
        }
        changed
    }

    /// True unless the console has taken `node_id`
    pub fn authority_has_control(&self, node_id: &str) -> bool {
        !self.lock().contains(node_id)
    }

    /// True only while the console holds `node_id`
    pub fn console_should_forward(&self, node_id: &str) -> bool {
        self.lock().contains(node_id)
    }

    /// Nodes under console control, sorted
    pub fn controlled_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.lock().iter().cloned().collect();
        nodes.sort();
        nodes
    }
}
