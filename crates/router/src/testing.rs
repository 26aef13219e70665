//! Test doubles shared by the unit tests

use crate::transport::{ConnectionId, Transport};
use dataagent_protocol::Message;
use std::collections::HashSet;
use std::sync::Mutex;

/// Transport that records every send
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ConnectionId, Message)>>,
    down: Mutex<HashSet<ConnectionId>>,
    closed: Mutex<Vec<ConnectionId>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(ConnectionId, Message)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, conn: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c.as_str() == conn)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn mark_down(&self, conn: &str) {
        self.down.lock().unwrap().insert(ConnectionId::from(conn));
    }

    pub fn closed(&self) -> Vec<ConnectionId> {
        self.closed.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, conn: &ConnectionId, message: &Message) -> bool {
        if self.down.lock().unwrap().contains(conn) {
            return false;
        }
        self.sent.lock().unwrap().push((conn.clone(), message.clone()));
        true
    }

    fn is_connected(&self, conn: &ConnectionId) -> bool {
        !self.down.lock().unwrap().contains(conn)
    }

    fn disconnect(&self, conn: &ConnectionId) {
        self.closed.lock().unwrap().push(conn.clone());
    }
}
