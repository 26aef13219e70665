//! Authority / operator console arbitration

use crate::test_utils::*;
use dataagent_router::{Outcome, Role};

fn setup() -> Harness {
    let h = Harness::new();
    h.connect("node", Role::Node);
    h.connect("tasking", Role::Tasking);
    h.connect("op", Role::Operator);
    h.send("node", Role::Node, registration("NODE-A"));
    h.transport.clear();
    h
}

#[test]
fn test_authority_controls_by_default() {
    let h = setup();
    assert!(h.ctx().arbiter.authority_has_control("NODE-A"));

    assert_eq!(h.send("tasking", Role::Tasking, task("AUTH", "NODE-A")), Outcome::Task);
    assert_eq!(h.transport.sent_to("node").len(), 1);
    assert_eq!(h.transport.sent_to("op").len(), 1);

    h.transport.clear();
    assert_eq!(h.send("op", Role::Operator, task("OPS", "NODE-A")), Outcome::SensorTaskDropped);
    assert!(h.transport.sent_to("node").is_empty());
}

#[test]
fn test_take_and_release_control() {
    let h = setup();

    assert_eq!(h.send("op", Role::Operator, control("OPS", "NODE-A", "Take Control")), Outcome::Task);
    assert!(h.ctx().arbiter.console_should_forward("NODE-A"));
    assert!(h.transport.sent_to("node").is_empty(), "control requests stay off the node link");
    assert_eq!(h.transport.sent_to("tasking").len(), 1);

    h.transport.clear();
    let console_task = task("OPS", "NODE-A");
    assert_eq!(h.send("op", Role::Operator, console_task), Outcome::Task);
    assert_eq!(h.transport.sent_to("node").len(), 1);

    assert_eq!(h.send("tasking", Role::Tasking, task("AUTH", "NODE-A")), Outcome::SensorTaskDropped);

    assert_eq!(h.send("op", Role::Operator, control("OPS", "NODE-A", "Release Control")), Outcome::Task);
    assert!(h.ctx().arbiter.authority_has_control("NODE-A"));
    assert_eq!(h.send("op", Role::Operator, task("OPS", "NODE-A")), Outcome::SensorTaskDropped);
    assert_eq!(h.send("tasking", Role::Tasking, task("AUTH", "NODE-A")), Outcome::Task);
}

#[test]
fn test_control_is_per_node() {
    let h = setup();
    h.connect("node-b", Role::Node);
    h.send("node-b", Role::Node, registration("NODE-B"));

    h.send("op", Role::Operator, control("OPS", "NODE-A", "Take Control"));
    assert_eq!(h.send("tasking", Role::Tasking, task("AUTH", "NODE-B")), Outcome::Task);
    assert_eq!(h.ctx().arbiter.controlled_nodes(), vec!["NODE-A".to_string()]);
}
