//! Fixtures shared by the integration suites

use chrono::{DateTime, TimeZone, Utc};
use dataagent_protocol::{
    Content, DetectionReport, Message, Registration, StatusReport, SystemStatus, Task, TaskControl,
};
use dataagent_router::{
    Clock, ConnectionId, Dispatcher, DispatcherConfig, ManualClock, Outcome, Role, RouterContext,
    RouterContextBuilder, Transport,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Once};

static LOGGING: Once = Once::new();

/// Route test logs through the test harness writer
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    });
}

/// Fixed start time so window arithmetic is deterministic
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now)
}

/// Transport that records sends and can simulate faults per connection
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ConnectionId, Message)>>,
    panic_on: Mutex<HashSet<ConnectionId>>,
}

impl RecordingTransport {
    /// Every send so far
    pub fn sent(&self) -> Vec<(ConnectionId, Message)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages delivered to `conn`
    pub fn sent_to(&self, conn: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c.as_str() == conn)
            .map(|(_, m)| m)
            .collect()
    }

    /// Forget recorded sends
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Make every send to `conn` panic
    pub fn panic_on(&self, conn: &str) {
        self.panic_on.lock().unwrap().insert(ConnectionId::from(conn));
    }
}

impl Transport for RecordingTransport {
    fn send(&self, conn: &ConnectionId, message: &Message) -> bool {
        if self.panic_on.lock().unwrap().contains(conn) {
            panic!("simulated transport fault on {conn}");
        }
        self.sent.lock().unwrap().push((conn.clone(), message.clone()));
        true
    }
}

/// Dispatcher wired to a recording transport and a manual clock
pub struct Harness {
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<ManualClock>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    /// Default settings
    pub fn new() -> Self {
        Self::with(|builder| builder, DispatcherConfig::default())
    }

    /// Customise the context builder and dispatcher configuration
    pub fn with(
        customise: impl FnOnce(RouterContextBuilder) -> RouterContextBuilder,
        config: DispatcherConfig,
    ) -> Self {
        init_logging();
        let transport = Arc::new(RecordingTransport::default());
        let clock = Arc::new(ManualClock::new(epoch()));
        let builder = RouterContext::builder(transport.clone()).clock(clock.clone());
        let ctx = customise(builder).build();
        let dispatcher = Arc::new(Dispatcher::new(ctx, config));
        Self {
            transport,
            clock,
            dispatcher,
        }
    }

    /// Shared state
    pub fn ctx(&self) -> &Arc<RouterContext> {
        self.dispatcher.context()
    }

    /// Open a connection
    pub fn connect(&self, conn: &str, role: Role) -> ConnectionId {
        let conn = ConnectionId::from(conn);
        self.dispatcher.on_connected(&conn, role);
        conn
    }

    /// Close a connection
    pub fn disconnect(&self, conn: &str) {
        self.dispatcher.on_disconnected(&ConnectionId::from(conn));
    }

    /// Deliver a decoded message
    pub fn send(&self, conn: &str, role: Role, msg: Message) -> Outcome {
        self.dispatcher
            .on_message(&ConnectionId::from(conn), role, Some(msg.with_timestamp(self.clock.now())))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration from `node`
pub fn registration(node: &str) -> Message {
    Message::new(node, Content::Registration(Registration::new("radar")))
}

/// DetectionReport from `node`
pub fn detection(node: &str) -> Message {
    Message::new(node, Content::DetectionReport(DetectionReport::new("rpt-1", "trk-1")))
}

/// StatusReport from `node`
pub fn status(node: &str) -> Message {
    Message::new(node, Content::StatusReport(StatusReport::new("st-1", SystemStatus::Ok)))
}

/// Control Task from `sender` to `node`
pub fn task(sender: &str, node: &str) -> Message {
    Message::new(sender, Content::Task(Task::new("task-1", TaskControl::Start))).with_destination(node)
}

/// Manual-control request from a console
pub fn control(sender: &str, node: &str, request: &str) -> Message {
    Message::new(sender, Content::Task(Task::request("ctl-1", request))).with_destination(node)
}
