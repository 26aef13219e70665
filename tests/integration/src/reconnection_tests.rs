//! Reconnection window

use crate::test_utils::*;
use dataagent_router::{ConnectionId, Outcome, Role};
use std::time::Duration;

fn registered_then_dropped() -> Harness {
    let h = Harness::new();
    h.connect("tasking", Role::Tasking);
    h.connect("conn-1", Role::Node);
    assert_eq!(h.send("conn-1", Role::Node, registration("NODE-A")), Outcome::Registration);
    h.disconnect("conn-1");
    h.connect("conn-2", Role::Node);
    h.transport.clear();
    h
}

#[test]
fn test_report_within_window_is_accepted() {
    let h = registered_then_dropped();
    h.clock.advance(Duration::from_secs(30));

    assert_eq!(h.send("conn-2", Role::Node, detection("NODE-A")), Outcome::Detection);
    assert_eq!(h.transport.sent_to("tasking").len(), 1);
    assert_eq!(
        h.ctx().registry.lookup_connection("NODE-A"),
        Some(ConnectionId::from("conn-2"))
    );
}

#[test]
fn test_report_after_window_is_id_error() {
    let h = registered_then_dropped();
    h.clock.advance(h.ctx().settings.reconnection_timeout + Duration::from_secs(1));

    assert_eq!(h.send("conn-2", Role::Node, detection("NODE-A")), Outcome::IdError);
    assert!(h.transport.sent().is_empty());
}

#[test]
fn test_fresh_registration_after_expiry() {
    let h = registered_then_dropped();
    h.clock.advance(Duration::from_secs(3600));

    assert_eq!(h.send("conn-2", Role::Node, status("NODE-A")), Outcome::IdError);
    assert_eq!(h.send("conn-2", Role::Node, registration("NODE-A")), Outcome::Registration);
    assert_eq!(h.send("conn-2", Role::Node, status("NODE-A")), Outcome::Status);
}

#[test]
fn test_activity_extends_window() {
    let h = Harness::new();
    h.connect("conn-1", Role::Node);
    h.send("conn-1", Role::Node, registration("NODE-A"));

    // Reports refresh the tracker while the node is live
    h.clock.advance(Duration::from_secs(50));
    assert_eq!(h.send("conn-1", Role::Node, status("NODE-A")), Outcome::Status);
    h.disconnect("conn-1");

    h.connect("conn-2", Role::Node);
    h.clock.advance(Duration::from_secs(50));
    assert_eq!(h.send("conn-2", Role::Node, detection("NODE-A")), Outcome::Detection);
}
