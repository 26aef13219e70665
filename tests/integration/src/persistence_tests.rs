//! Routed traffic reaching SQLite

use crate::test_utils::*;
use dataagent_router::{DispatcherConfig, LatencyChannel, MessageMonitor, Outcome, Role, SqliteSink};
use rusqlite::Connection;
use std::sync::Arc;

#[test]
fn test_accepted_messages_are_persisted() {
    let path = std::env::temp_dir().join(format!("dataagent-it-{}.db", uuid::Uuid::new_v4()));
    let monitor = Arc::new(MessageMonitor::new());
    let sink = Arc::new(SqliteSink::open(&path, monitor.clone()).unwrap());

    let h = Harness::with(
        |b| b.monitor(monitor.clone()).persistence(sink.clone()),
        DispatcherConfig::default(),
    );
    h.connect("node", Role::Node);
    assert_eq!(h.send("node", Role::Node, registration("NODE-A")), Outcome::Registration);
    assert_eq!(h.send("node", Role::Node, detection("NODE-A")), Outcome::Detection);
    // Refused traffic is not stored
    assert_eq!(h.send("node", Role::Node, status("NODE-Z")), Outcome::IdError);
    sink.shutdown();

    let conn = Connection::open(&path).unwrap();
    let mut stmt = conn.prepare("SELECT kind, node_id FROM messages ORDER BY seq_no").unwrap();
    let rows: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(
        rows,
        vec![
            ("registration".to_string(), "NODE-A".to_string()),
            ("detection_report".to_string(), "NODE-A".to_string()),
        ]
    );
    assert_eq!(monitor.latency(LatencyChannel::Persistence).count, 2);

    drop(stmt);
    drop(conn);
    let _ = std::fs::remove_file(&path);
}
