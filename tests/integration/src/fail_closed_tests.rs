//! Fail-closed handling and synthesized diagnostics

use crate::test_utils::*;
use base64::Engine as _;
use dataagent_protocol::{Content, Message, TaskStatus};
use dataagent_router::{Outcome, Role};

#[test]
fn test_empty_message_is_unknown() {
    let h = Harness::new();
    h.connect("tasking", Role::Tasking);
    h.connect("conn-1", Role::Node);
    h.send("conn-1", Role::Node, registration("NODE-A"));
    h.transport.clear();

    let before = h.ctx().monitor.count(Outcome::Unknown);
    assert_eq!(h.send("conn-1", Role::Node, Message::empty("NODE-A")), Outcome::Unknown);
    assert_eq!(h.ctx().monitor.count(Outcome::Unknown), before + 1);
    assert!(h.transport.sent().is_empty());
}

#[test]
fn test_raw_record_without_content_is_unknown() {
    let h = Harness::new();
    let conn = h.connect("conn-1", Role::Node);
    let outcomes = h.dispatcher.on_data(&conn, Role::Node, b"{\"node_id\":\"NODE-A\"}\n");
    assert_eq!(outcomes, vec![Outcome::Unknown]);
    assert_eq!(h.ctx().monitor.count(Outcome::Unknown), 1);
}

#[test]
fn test_unrecognized_content_tag_is_unknown() {
    let h = Harness::new();
    h.connect("tasking", Role::Tasking);
    let conn = h.connect("conn-1", Role::Node);

    let outcomes = h.dispatcher.on_data(
        &conn,
        Role::Node,
        b"{\"node_id\":\"NODE-A\",\"content\":{\"sensor_fusion\":{}}}\n",
    );
    assert_eq!(outcomes, vec![Outcome::Unknown]);
    assert_eq!(h.ctx().monitor.count(Outcome::Unknown), 1);
    assert_eq!(h.ctx().monitor.count(Outcome::InvalidClient), 0);
    assert!(h.transport.sent().is_empty());

    // A known tag with a broken payload is still malformed
    let outcomes = h.dispatcher.on_data(
        &conn,
        Role::Node,
        b"{\"node_id\":\"NODE-A\",\"content\":{\"registration\":{}}}\n",
    );
    assert_eq!(outcomes, vec![Outcome::InvalidClient]);
}

#[test]
fn test_task_to_unregistered_node_is_rejected() {
    let h = Harness::new();
    h.connect("tasking", Role::Tasking);

    assert_eq!(h.send("tasking", Role::Tasking, task("AUTH", "NODE-X")), Outcome::IdError);

    let replies = h.transport.sent_to("tasking");
    assert_eq!(replies.len(), 1);
    match &replies[0].content {
        Some(Content::TaskAck(ack)) => {
            assert_eq!(ack.status, TaskStatus::Rejected);
            assert_eq!(ack.task_id, "task-1");
            assert!(ack.reasons.iter().any(|r| r.contains("NODE-X")));
        }
        other => panic!("expected rejected TaskAck, got {:?}", other),
    }
}

#[test]
fn test_invalid_tasking_content_echoes_packet() {
    let h = Harness::new();
    h.connect("tasking", Role::Tasking);
    let mut bad = task("AUTH", "NODE-A");
    if let Some(Content::Task(t)) = &mut bad.content {
        t.task_id.clear();
    }

    assert_eq!(h.send("tasking", Role::Tasking, bad), Outcome::InvalidTasking);
    let replies = h.transport.sent_to("tasking");
    let Some(Content::Error(error)) = &replies[0].content else {
        panic!("expected Error reply, got {:?}", replies[0]);
    };
    let packet = error.packet.as_ref().expect("echo attached");
    let bytes = base64::engine::general_purpose::STANDARD.decode(packet).unwrap();
    let echoed: Message = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(echoed.node_id, "AUTH");
}

#[test]
fn test_node_message_on_operator_channel_is_unsupported() {
    let h = Harness::new();
    h.connect("tasking", Role::Tasking);
    h.connect("op", Role::Operator);

    assert_eq!(h.send("op", Role::Operator, detection("NODE-A")), Outcome::Unsupported);
    assert_eq!(h.send("tasking", Role::Tasking, registration("NODE-A")), Outcome::Unsupported);
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.ctx().monitor.count(Outcome::Unsupported), 2);
}

#[test]
fn test_oversized_and_garbage_records_are_invalid_client() {
    let h = Harness::new();
    let conn = h.connect("conn-1", Role::Node);
    let mut bytes = vec![b'x'; dataagent_protocol::MAX_FRAME_LEN + 10];
    bytes.push(b'\n');
    bytes.extend_from_slice(b"}{\n");

    let outcomes = h.dispatcher.on_data(&conn, Role::Node, &bytes);
    assert_eq!(outcomes, vec![Outcome::InvalidClient, Outcome::InvalidClient]);
}
