//! Dispatcher
//!
//! Entry point for transport callbacks. Owns one [`ProtocolRouter`] per live
//! connection (or one shared node router), the per-connection frame
//! buffers, and the periodic liveness tick.
//!
//! # Failure isolation
//!
//! Each message is routed under `catch_unwind`. A fault on one connection is
//! logged, counted as [`Outcome::InternalError`] and clears that
//! connection's partial frame; other connections are unaffected.

use crate::clock::elapsed_ms;
use crate::context::RouterContext;
use crate::monitor::LatencyChannel;
use crate::outcome::Outcome;
use crate::router::{panic_message, ProtocolRouter};
use crate::transport::{ConnectionId, Role};
use chrono::{DateTime, Utc};
use dataagent_core::{AgentConfig, NodeRouterMode, SilenceConfig};
use dataagent_protocol::{codec, FrameBuffer, Message, MAX_FRAME_LEN};
use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Dispatcher tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Router instantiation for the node role
    pub node_router_mode: NodeRouterMode,
    /// Silence after which a connection is dropped, per role
    pub silence: SilenceThresholds,
    /// Maximum record length accepted by the frame buffers
    pub max_frame_len: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for DispatcherConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            node_router_mode: config.node_router_mode,
            silence: SilenceThresholds::from(&config.silence_threshold_secs),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

/// Per-role silence thresholds; `None` disables the check for that role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SilenceThresholds {
    /// Node connections
    pub node: Option<Duration>,
    /// Tasking connections
    pub tasking: Option<Duration>,
    /// Operator console connections
    pub operator: Option<Duration>,
}

impl SilenceThresholds {
    /// Threshold applied to connections of `role`
    pub fn for_role(&self, role: Role) -> Option<Duration> {
        match role {
            Role::Node => self.node,
            Role::Tasking => self.tasking,
            Role::Operator => self.operator,
        }
    }
}

impl From<&SilenceConfig> for SilenceThresholds {
    fn from(config: &SilenceConfig) -> Self {
        Self {
            node: SilenceConfig::threshold(config.node),
            tasking: SilenceConfig::threshold(config.tasking),
            operator: SilenceConfig::threshold(config.operator),
        }
    }
}

#[derive(Debug)]
struct ConnectionSlot {
    role: Role,
    frames: FrameBuffer,
    last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RouterKey {
    Connection(ConnectionId),
    SharedNode,
}

type SharedRouter = Arc<Mutex<ProtocolRouter>>;

/// Connection callbacks in, routed messages out
pub struct Dispatcher {
    ctx: Arc<RouterContext>,
    config: DispatcherConfig,
    routers: Mutex<HashMap<RouterKey, SharedRouter>>,
    connections: Mutex<HashMap<ConnectionId, ConnectionSlot>>,
}

impl Dispatcher {
    /// Dispatcher over shared routing state
    pub fn new(ctx: Arc<RouterContext>, config: DispatcherConfig) -> Self {
        Self {
            ctx,
            config,
            routers: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Shared routing state
    pub fn context(&self) -> &Arc<RouterContext> {
        &self.ctx
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionSlot>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn routers(&self) -> MutexGuard<'_, HashMap<RouterKey, SharedRouter>> {
        self.routers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_slot(&self, role: Role) -> ConnectionSlot {
        ConnectionSlot {
            role,
            frames: FrameBuffer::with_max_len(self.config.max_frame_len),
            last_activity: self.ctx.clock.now(),
        }
    }

    /// Live connections across all roles
    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    /// Connection-established callback
    ///
    /// A new tasking connection receives every cached Registration whose node
    /// is still bound or inside the reconnection window.
    pub fn on_connected(&self, conn: &ConnectionId, role: Role) {
        self.connections().insert(conn.clone(), self.new_slot(role));
        self.ctx.peers.add(role, conn.clone());
        info!(conn = %conn, %role, "connection established");

        if role == Role::Tasking {
            let mut resent = 0usize;
            for registration in self.ctx.registrations.snapshot() {
                if self.ctx.is_known_node(&registration.node_id) && self.ctx.send(conn, &registration) {
                    resent += 1;
                }
            }
            if resent > 0 {
                info!(conn = %conn, resent, "cached registrations replayed to tasking authority");
            }
        }
        self.publish_gauges();
    }

    /// Connection-lost callback
    ///
    /// Node bindings are released so the ids can register elsewhere; the
    /// reconnection tracker keeps its entries.
    pub fn on_disconnected(&self, conn: &ConnectionId) {
        let slot = self.connections().remove(conn);
        let role = self.ctx.peers.remove(conn).or(slot.map(|s| s.role));

        let released = self.ctx.registry.remove(conn);
        self.routers().remove(&RouterKey::Connection(conn.clone()));

        match role {
            Some(role) => info!(conn = %conn, %role, released = released.len(), "connection lost"),
            None => debug!(conn = %conn, "disconnect for untracked connection"),
        }
        self.publish_gauges();
    }

    /// Raw bytes from the transport
    ///
    /// Complete records are decoded and routed in arrival order. Records that
    /// are blank, oversized, not UTF-8 or not a message are counted as
    /// [`Outcome::InvalidClient`] and go no further.
    pub fn on_data(&self, conn: &ConnectionId, role: Role, bytes: &[u8]) -> Vec<Outcome> {
        let frames = {
            let mut connections = self.connections();
            let slot = connections
                .entry(conn.clone())
                .or_insert_with(|| self.new_slot(role));
            slot.frames.push(bytes)
        };

        let mut outcomes = Vec::with_capacity(frames.len());
        for frame in frames {
            let decoded = frame.and_then(|text| codec::decode(&text));
            match decoded {
                Ok(message) => outcomes.push(self.route(conn, role, message)),
                Err(e) => {
                    warn!(conn = %conn, %role, error = %e, "malformed record discarded");
                    self.ctx.monitor.increment_count(Outcome::InvalidClient);
                    outcomes.push(Outcome::InvalidClient);
                }
            }
        }
        outcomes
    }

    /// Already-decoded message from the transport; `None` is a decode failure
    pub fn on_message(&self, conn: &ConnectionId, role: Role, message: Option<Message>) -> Outcome {
        match message {
            Some(message) => self.route(conn, role, message),
            None => {
                warn!(conn = %conn, %role, "undecodable message discarded");
                self.ctx.monitor.increment_count(Outcome::InvalidClient);
                Outcome::InvalidClient
            }
        }
    }

    fn router_for(&self, conn: &ConnectionId, role: Role) -> SharedRouter {
        let key = match (role, self.config.node_router_mode) {
            (Role::Node, NodeRouterMode::Shared) => RouterKey::SharedNode,
            _ => RouterKey::Connection(conn.clone()),
        };
        self.routers()
            .entry(key)
            .or_insert_with(|| {
                debug!(conn = %conn, %role, "router created");
                Arc::new(Mutex::new(ProtocolRouter::new(conn.clone(), role, self.ctx.clone())))
            })
            .clone()
    }

    fn route(&self, conn: &ConnectionId, role: Role, message: Message) -> Outcome {
        let now = self.ctx.clock.now();
        if let Some(slot) = self.connections().get_mut(conn) {
            slot.last_activity = now;
        }
        if let Some(ms) = elapsed_ms(message.timestamp, now) {
            self.ctx.monitor.set_latency(LatencyChannel::Communication, ms);
        }

        let router = self.router_for(conn, role);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut router = router.lock().unwrap_or_else(PoisonError::into_inner);
            router.rebind(conn.clone());
            router.process(&message)
        }));

        match result {
            Ok(outcome) => outcome,
            Err(cause) => {
                error!(
                    conn = %conn,
                    %role,
                    node_id = %message.node_id,
                    detail = %panic_message(cause.as_ref()),
                    "routing fault; connection parse state reset"
                );
                if let Some(slot) = self.connections().get_mut(conn) {
                    slot.frames.reset();
                }
                self.ctx.monitor.increment_count(Outcome::InternalError);
                Outcome::InternalError
            }
        }
    }

    /// One liveness pass
    ///
    /// Drops connections the transport reports down or that have been silent
    /// past the threshold, then publishes gauges. Returns the dropped
    /// connections.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<ConnectionId> {
        let snapshot: Vec<(ConnectionId, Role, DateTime<Utc>)> = self
            .connections()
            .iter()
            .map(|(conn, slot)| (conn.clone(), slot.role, slot.last_activity))
            .collect();

        let mut dropped = Vec::new();
        for (conn, role, last_activity) in snapshot {
            let reason = if !self.ctx.transport.is_connected(&conn) {
                Some("transport reports connection down")
            } else {
                let silent = self.config.silence.for_role(role).is_some_and(|threshold| {
                    now.signed_duration_since(last_activity)
                        .to_std()
                        .is_ok_and(|silence| silence > threshold)
                });
                silent.then_some("silent past threshold")
            };

            if let Some(reason) = reason {
                warn!(conn = %conn, %role, reason, "dropping connection");
                self.ctx.transport.disconnect(&conn);
                self.on_disconnected(&conn);
                dropped.push(conn);
            }
        }

        self.publish_gauges();
        debug!(summary = %self.ctx.monitor.print(), "liveness tick");
        dropped
    }

    fn publish_gauges(&self) {
        for role in Role::ALL {
            self.ctx.monitor.set_clients(role, self.ctx.peers.count(role));
        }
    }

    /// Run [`Dispatcher::tick`] every `interval` on a dedicated thread
    pub fn spawn_liveness(self: &Arc<Self>, interval: Duration) -> io::Result<LivenessHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let dispatcher = Arc::clone(self);
        let thread = thread::Builder::new()
            .name("liveness".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        dispatcher.tick(dispatcher.ctx.clock.now());
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        info!(interval_secs = interval.as_secs_f64(), "liveness monitor started");
        Ok(LivenessHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

/// Running liveness thread; stopped on [`LivenessHandle::stop`] or drop
#[derive(Debug)]
pub struct LivenessHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl LivenessHandle {
    /// Stop the thread and wait for it
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("liveness thread panicked");
            }
        }
    }
}

impl Drop for LivenessHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::testing::RecordingTransport;
    use dataagent_protocol::{Content, DetectionReport, Registration};

    fn setup(config: DispatcherConfig) -> (Arc<RecordingTransport>, Arc<ManualClock>, Arc<Dispatcher>) {
        let transport = Arc::new(RecordingTransport::default());
        let clock = Arc::new(ManualClock::default());
        let ctx = RouterContext::builder(transport.clone()).clock(clock.clone()).build();
        (transport, clock, Arc::new(Dispatcher::new(ctx, config)))
    }

    fn line(msg: &Message) -> Vec<u8> {
        codec::encode(msg).unwrap().into_bytes()
    }

    fn registration(node: &str) -> Message {
        Message::new(node, Content::Registration(Registration::new("radar")))
    }

    #[test]
    fn test_on_data_routes_complete_frames() {
        let (transport, _clock, dispatcher) = setup(DispatcherConfig::default());
        let tasking = ConnectionId::from("tasking");
        let node = ConnectionId::from("node-1");
        dispatcher.on_connected(&tasking, Role::Tasking);
        dispatcher.on_connected(&node, Role::Node);

        let bytes = line(&registration("NODE-A"));
        let (a, b) = bytes.split_at(5);
        assert!(dispatcher.on_data(&node, Role::Node, a).is_empty());
        assert_eq!(dispatcher.on_data(&node, Role::Node, b), vec![Outcome::Registration]);
        assert_eq!(transport.sent_to("tasking").len(), 1);
    }

    #[test]
    fn test_garbage_counts_invalid_client() {
        let (transport, _clock, dispatcher) = setup(DispatcherConfig::default());
        let node = ConnectionId::from("node-1");
        dispatcher.on_connected(&node, Role::Node);

        assert_eq!(dispatcher.on_data(&node, Role::Node, b"not json\n"), vec![Outcome::InvalidClient]);
        assert_eq!(dispatcher.on_message(&node, Role::Node, None), Outcome::InvalidClient);
        assert_eq!(dispatcher.context().monitor.count(Outcome::InvalidClient), 2);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_disconnect_releases_binding_but_keeps_window() {
        let (_transport, _clock, dispatcher) = setup(DispatcherConfig::default());
        let node = ConnectionId::from("node-1");
        dispatcher.on_connected(&node, Role::Node);
        dispatcher.on_message(&node, Role::Node, Some(registration("NODE-A")));

        dispatcher.on_disconnected(&node);
        let ctx = dispatcher.context();
        assert!(ctx.registry.lookup_connection("NODE-A").is_none());
        assert!(ctx.tracker.last_seen("NODE-A").is_some());
        assert_eq!(dispatcher.connection_count(), 0);
    }

    #[test]
    fn test_tasking_connect_replays_live_registrations() {
        let (transport, clock, dispatcher) = setup(DispatcherConfig::default());
        let node = ConnectionId::from("node-1");
        dispatcher.on_connected(&node, Role::Node);
        dispatcher.on_message(&node, Role::Node, Some(registration("NODE-A")));

        dispatcher.on_connected(&"tasking-1".into(), Role::Tasking);
        assert_eq!(transport.sent_to("tasking-1").len(), 1);

        dispatcher.on_disconnected(&node);
        clock.advance(Duration::from_secs(3600));
        dispatcher.on_connected(&"tasking-2".into(), Role::Tasking);
        assert!(transport.sent_to("tasking-2").is_empty());
    }

    #[test]
    fn test_tick_drops_silent_and_down_connections() {
        let config = DispatcherConfig {
            silence: SilenceThresholds {
                node: Some(Duration::from_secs(30)),
                operator: Some(Duration::from_secs(30)),
                ..SilenceThresholds::default()
            },
            ..DispatcherConfig::default()
        };
        let (transport, clock, dispatcher) = setup(config);
        dispatcher.on_connected(&"quiet".into(), Role::Operator);
        dispatcher.on_connected(&"down".into(), Role::Node);
        dispatcher.on_connected(&"busy".into(), Role::Node);
        transport.mark_down("down");

        clock.advance(Duration::from_secs(31));
        dispatcher.on_message(&"busy".into(), Role::Node, Some(Message::empty("NODE-B")));

        let mut dropped = dispatcher.tick(clock.now());
        dropped.sort();
        assert_eq!(dropped, vec![ConnectionId::from("down"), ConnectionId::from("quiet")]);
        assert_eq!(transport.closed().len(), 2);

        let monitor = &dispatcher.context().monitor;
        assert_eq!(monitor.clients(Role::Node), 1);
        assert_eq!(monitor.clients(Role::Operator), 0);
    }

    #[test]
    fn test_default_silence_keeps_receive_only_links() {
        let (transport, clock, dispatcher) = setup(DispatcherConfig::default());
        let node = ConnectionId::from("node-1");
        dispatcher.on_connected(&"tasking".into(), Role::Tasking);
        dispatcher.on_connected(&"console".into(), Role::Operator);
        dispatcher.on_connected(&node, Role::Node);
        dispatcher.on_message(&node, Role::Node, Some(registration("NODE-A")));

        // Node keeps reporting every 5 s for ten minutes; tasking and console never speak
        for i in 0..120 {
            clock.advance(Duration::from_secs(5));
            let detection = Message::new(
                "NODE-A",
                Content::DetectionReport(DetectionReport::new(format!("r{i}"), "o1")),
            );
            assert_eq!(dispatcher.on_message(&node, Role::Node, Some(detection)), Outcome::Detection);
            assert!(dispatcher.tick(clock.now()).is_empty());
        }

        assert_eq!(transport.sent_to("tasking").len(), 121);
        assert_eq!(dispatcher.connection_count(), 3);
        assert_eq!(dispatcher.context().monitor.clients(Role::Tasking), 1);

        // The node itself is still held to its threshold
        clock.advance(Duration::from_secs(121));
        assert_eq!(dispatcher.tick(clock.now()), vec![node]);
    }

    #[test]
    fn test_shared_node_router_follows_peer() {
        let config = DispatcherConfig {
            node_router_mode: NodeRouterMode::Shared,
            ..DispatcherConfig::default()
        };
        let (_transport, clock, dispatcher) = setup(config);
        dispatcher.on_connected(&"peer-1".into(), Role::Node);
        dispatcher.on_message(&"peer-1".into(), Role::Node, Some(registration("NODE-A")));
        dispatcher.on_disconnected(&"peer-1".into());

        clock.advance(Duration::from_secs(5));
        dispatcher.on_connected(&"peer-2".into(), Role::Node);
        let detection = Message::new("NODE-A", Content::DetectionReport(DetectionReport::new("r1", "o1")));
        assert_eq!(
            dispatcher.on_message(&"peer-2".into(), Role::Node, Some(detection)),
            Outcome::Detection
        );
        assert_eq!(
            dispatcher.context().registry.lookup_connection("NODE-A"),
            Some(ConnectionId::from("peer-2"))
        );
    }

    #[test]
    fn test_liveness_thread_stops() {
        let (_transport, _clock, dispatcher) = setup(DispatcherConfig::default());
        let handle = dispatcher.spawn_liveness(Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(30));
        handle.stop();
    }
}
