//! Identity binding, collisions and cardinality

use crate::test_utils::*;
use dataagent_core::IdentityCardinality;
use dataagent_router::{ConnectionId, DispatcherConfig, Outcome, Role, RouterSettings};

#[test]
fn test_registration_binds_identity() {
    let h = Harness::new();
    h.connect("conn-1", Role::Node);

    assert_eq!(h.send("conn-1", Role::Node, registration("NODE-A")), Outcome::Registration);
    assert_eq!(
        h.ctx().registry.lookup_connection("NODE-A"),
        Some(ConnectionId::from("conn-1"))
    );
}

#[test]
fn test_collision_while_live_then_success_after_removal() {
    let h = Harness::new();
    h.connect("tasking", Role::Tasking);
    h.connect("conn-1", Role::Node);
    h.connect("conn-2", Role::Node);

    assert_eq!(h.send("conn-1", Role::Node, registration("NODE-A")), Outcome::Registration);
    h.transport.clear();

    assert_eq!(h.send("conn-2", Role::Node, registration("NODE-A")), Outcome::IdError);
    assert!(h.transport.sent().is_empty(), "colliding registration must not be forwarded");

    h.disconnect("conn-1");
    assert_eq!(h.send("conn-2", Role::Node, registration("NODE-A")), Outcome::Registration);
    assert_eq!(
        h.ctx().registry.lookup_connection("NODE-A"),
        Some(ConnectionId::from("conn-2"))
    );
    assert_eq!(h.transport.sent_to("tasking").len(), 1);
}

#[test]
fn test_repeated_registration_is_idempotent() {
    let h = Harness::new();
    h.connect("conn-1", Role::Node);
    let first = h.send("conn-1", Role::Node, registration("NODE-A"));
    let second = h.send("conn-1", Role::Node, registration("NODE-A"));
    assert_eq!(first, second);
    assert_eq!(h.ctx().registry.node_count(), 1);
}

#[test]
fn test_default_cardinality_per_role() {
    let h = Harness::new();
    h.connect("node", Role::Node);
    h.connect("node-peer", Role::Node);
    h.connect("tasking", Role::Tasking);
    h.connect("op", Role::Operator);
    h.send("node-peer", Role::Node, registration("NODE-A"));

    // Node: one id per connection
    assert_eq!(h.send("node", Role::Node, registration("NODE-B")), Outcome::Registration);
    assert_eq!(h.send("node", Role::Node, registration("NODE-C")), Outcome::IdError);

    // Tasking: several sender ids on one connection
    assert_eq!(h.send("tasking", Role::Tasking, task("AUTH-1", "NODE-A")), Outcome::Task);
    assert_eq!(h.send("tasking", Role::Tasking, task("AUTH-2", "NODE-A")), Outcome::Task);

    // Operator: one sender id per connection
    assert_eq!(h.send("op", Role::Operator, control("OPS-1", "NODE-A", "Take Control")), Outcome::Task);
    assert_eq!(h.send("op", Role::Operator, control("OPS-2", "NODE-A", "Take Control")), Outcome::IdError);
}

#[test]
fn test_tasking_cardinality_can_be_restricted() {
    let settings = RouterSettings {
        tasking_cardinality: IdentityCardinality::Single,
        ..RouterSettings::default()
    };
    let h = Harness::with(|b| b.settings(settings), DispatcherConfig::default());
    h.connect("node", Role::Node);
    h.connect("tasking", Role::Tasking);
    h.send("node", Role::Node, registration("NODE-A"));

    assert_eq!(h.send("tasking", Role::Tasking, task("AUTH-1", "NODE-A")), Outcome::Task);
    assert_eq!(h.send("tasking", Role::Tasking, task("AUTH-2", "NODE-A")), Outcome::IdError);
}

#[test]
fn test_tasking_reconnect_receives_cached_registrations() {
    let h = Harness::new();
    h.connect("node-1", Role::Node);
    h.connect("node-2", Role::Node);
    h.send("node-1", Role::Node, registration("NODE-A"));
    h.send("node-2", Role::Node, registration("NODE-B"));

    h.connect("tasking", Role::Tasking);
    let replayed: Vec<String> = h
        .transport
        .sent_to("tasking")
        .into_iter()
        .map(|m| m.node_id)
        .collect();
    assert_eq!(replayed, vec!["NODE-A", "NODE-B"]);
}
