//! Per-connection failure isolation

use crate::test_utils::*;
use dataagent_protocol::{codec, Content, ContentKind, Message, Registration, ValidationReport, Validator};
use dataagent_router::{ConnectionId, DispatcherConfig, Outcome, Role};
use std::sync::Arc;

/// Validator that blows up on one poisoned NodeId
struct TrippedValidator;

impl Validator for TrippedValidator {
    fn validate(&self, message: &Message, _expected: ContentKind) -> ValidationReport {
        if message.node_id == "NODE-BAD" {
            panic!("validator fault");
        }
        ValidationReport::valid()
    }
}

#[test]
fn test_handler_fault_does_not_affect_other_connection() {
    let h = Harness::with(
        |b| b.validator(Arc::new(TrippedValidator)),
        DispatcherConfig::default(),
    );
    h.connect("tasking", Role::Tasking);
    h.connect("conn-1", Role::Node);
    h.connect("conn-2", Role::Node);

    assert_eq!(h.send("conn-1", Role::Node, registration("NODE-BAD")), Outcome::InternalError);
    assert_eq!(h.send("conn-2", Role::Node, registration("NODE-A")), Outcome::Registration);
    assert_eq!(h.send("conn-2", Role::Node, detection("NODE-A")), Outcome::Detection);

    let forwarded = h.transport.sent_to("tasking");
    assert_eq!(forwarded.len(), 2);
    assert!(forwarded.iter().all(|m| m.node_id == "NODE-A"));
}

#[test]
fn test_transport_fault_is_contained() {
    let h = Harness::new();
    h.connect("tasking", Role::Tasking);
    h.connect("conn-1", Role::Node);
    h.connect("conn-2", Role::Node);
    h.transport.panic_on("conn-1");

    // Invalid registration triggers a reply on conn-1, whose transport panics
    let bad = Message::new("NODE-Q", Content::Registration(Registration::new("")));
    let conn1 = ConnectionId::from("conn-1");
    let mut bytes = codec::encode(&bad).unwrap().into_bytes();
    bytes.extend_from_slice(b"{\"node_id\":");
    assert_eq!(
        h.dispatcher.on_data(&conn1, Role::Node, &bytes),
        vec![Outcome::InternalError]
    );

    assert_eq!(h.send("conn-2", Role::Node, registration("NODE-A")), Outcome::Registration);
    assert_eq!(h.transport.sent_to("tasking").len(), 1);

    // The partial record on conn-1 was discarded with the fault
    let next = codec::encode(&registration("NODE-B")).unwrap();
    assert_eq!(
        h.dispatcher.on_data(&conn1, Role::Node, next.as_bytes()),
        vec![Outcome::Registration]
    );
}
