//! Protocol router
//!
//! One [`ProtocolRouter`] serves one connection (or, in shared node mode, the
//! single expected node peer). It classifies each message into an
//! [`Outcome`] through the role's [`RoleHandler`], then forwards the message
//! or synthesizes a diagnostic reply.
//!
//! Handlers never return errors: schema failures, unknown ids and refused
//! tasks are outcomes. A panic inside a handler is caught here and becomes
//! [`Outcome::InternalError`].

mod node;
mod operator;
mod tasking;

pub use node::NodeFacing;
pub use operator::OperatorFacing;
pub use tasking::TaskingFacing;

use crate::context::RouterContext;
use crate::outcome::Outcome;
use crate::transport::{ConnectionId, Role};
use chrono::{DateTime, Utc};
use dataagent_core::IdentityCardinality;
use dataagent_protocol::{
    Alert, AlertAck, Content, ContentKind, DetectionReport, ErrorMessage, Message, NodeId,
    Registration, RegistrationAck, StatusReport, Task, TaskAck,
};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Classification result with an optional human-readable reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Outcome of the message
    pub outcome: Outcome,
    /// Why a non-success outcome was chosen
    pub reason: Option<String>,
}

impl Verdict {
    /// Success outcome for `kind`
    pub fn accept(kind: ContentKind) -> Self {
        Self {
            outcome: Outcome::accepted(kind),
            reason: None,
        }
    }

    /// Failure outcome with a reason
    pub fn reject(outcome: Outcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: Some(reason.into()),
        }
    }

    /// Content not handled on this role
    pub fn unsupported() -> Self {
        Self {
            outcome: Outcome::Unsupported,
            reason: None,
        }
    }
}

/// Per-message view handed to role handlers
pub struct HandlerCx<'a> {
    /// Shared state
    pub ctx: &'a RouterContext,
    /// Connection the message arrived on
    pub conn: &'a ConnectionId,
    /// NodeIds this router has accepted so far
    pub claimed: &'a mut BTreeSet<NodeId>,
    /// Time of classification
    pub now: DateTime<Utc>,
}

/// Role-specific classification and forwarding rules
///
/// Every content handler defaults to [`Verdict::unsupported`]; a role
/// overrides only what its channel carries.
#[allow(unused_variables)]
pub trait RoleHandler: Send {
    /// Role this handler serves
    fn role(&self) -> Role;

    /// Content kinds accepted on this role
    fn supported(&self) -> &'static [ContentKind];

    /// Registration
    fn on_registration(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &Registration) -> Verdict {
        Verdict::unsupported()
    }

    /// RegistrationAck
    fn on_registration_ack(
        &self,
        cx: &mut HandlerCx<'_>,
        msg: &Message,
        payload: &RegistrationAck,
    ) -> Verdict {
        Verdict::unsupported()
    }

    /// StatusReport
    fn on_status(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &StatusReport) -> Verdict {
        Verdict::unsupported()
    }

    /// DetectionReport
    fn on_detection(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &DetectionReport) -> Verdict {
        Verdict::unsupported()
    }

    /// Alert
    fn on_alert(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &Alert) -> Verdict {
        Verdict::unsupported()
    }

    /// AlertAck
    fn on_alert_ack(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &AlertAck) -> Verdict {
        Verdict::unsupported()
    }

    /// Task
    fn on_task(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &Task) -> Verdict {
        Verdict::unsupported()
    }

    /// TaskAck
    fn on_task_ack(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &TaskAck) -> Verdict {
        Verdict::unsupported()
    }

    /// Error
    fn on_error(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &ErrorMessage) -> Verdict {
        Verdict::unsupported()
    }

    /// Connections a successfully classified message is forwarded to
    fn targets(&self, cx: &HandlerCx<'_>, msg: &Message, outcome: Outcome) -> Vec<ConnectionId>;
}

/// Handler for `role`
pub fn handler_for(role: Role) -> Box<dyn RoleHandler> {
    match role {
        Role::Node => Box::new(NodeFacing),
        Role::Tasking => Box::new(TaskingFacing),
        Role::Operator => Box::new(OperatorFacing),
    }
}

fn dispatch(handler: &dyn RoleHandler, cx: &mut HandlerCx<'_>, msg: &Message, content: &Content) -> Verdict {
    match content {
        Content::Registration(p) => handler.on_registration(cx, msg, p),
        Content::RegistrationAck(p) => handler.on_registration_ack(cx, msg, p),
        Content::StatusReport(p) => handler.on_status(cx, msg, p),
        Content::DetectionReport(p) => handler.on_detection(cx, msg, p),
        Content::Alert(p) => handler.on_alert(cx, msg, p),
        Content::AlertAck(p) => handler.on_alert_ack(cx, msg, p),
        Content::Task(p) => handler.on_task(cx, msg, p),
        Content::TaskAck(p) => handler.on_task_ack(cx, msg, p),
        Content::Error(p) => handler.on_error(cx, msg, p),
    }
}

/// Per-connection classify-and-respond state machine
pub struct ProtocolRouter {
    conn: ConnectionId,
    handler: Box<dyn RoleHandler>,
    claimed: BTreeSet<NodeId>,
    ctx: Arc<RouterContext>,
}

impl ProtocolRouter {
    /// Router for `conn` on `role`
    pub fn new(conn: ConnectionId, role: Role, ctx: Arc<RouterContext>) -> Self {
        Self::with_handler(conn, handler_for(role), ctx)
    }

    /// Router with a custom handler
    pub fn with_handler(conn: ConnectionId, handler: Box<dyn RoleHandler>, ctx: Arc<RouterContext>) -> Self {
        Self {
            conn,
            handler,
            claimed: BTreeSet::new(),
            ctx,
        }
    }

    /// Role served
    pub fn role(&self) -> Role {
        self.handler.role()
    }

    /// Connection currently served
    pub fn connection(&self) -> &ConnectionId {
        &self.conn
    }

    /// NodeIds accepted so far
    pub fn claimed(&self) -> &BTreeSet<NodeId> {
        &self.claimed
    }

    /// Follow the peer to a new connection, keeping accumulated ids
    pub fn rebind(&mut self, conn: ConnectionId) {
        if self.conn != conn {
            debug!(from = %self.conn, to = %conn, role = %self.role(), "router rebound");
            self.conn = conn;
        }
    }

    /// Classify `msg` without forwarding
    pub fn classify(&mut self, msg: &Message) -> Verdict {
        let Some(content) = &msg.content else {
            return Verdict::reject(Outcome::Unknown, "message carries no content");
        };
        let kind = content.kind();
        if !self.handler.supported().contains(&kind) {
            return Verdict::reject(
                Outcome::Unsupported,
                format!("{kind} not accepted on the {} channel", self.role()),
            );
        }

        let handler = self.handler.as_ref();
        let mut cx = HandlerCx {
            ctx: &self.ctx,
            conn: &self.conn,
            claimed: &mut self.claimed,
            now: self.ctx.clock.now(),
        };
        match panic::catch_unwind(AssertUnwindSafe(|| dispatch(handler, &mut cx, msg, content))) {
            Ok(verdict) => verdict,
            Err(cause) => {
                let detail = panic_message(cause.as_ref());
                error!(conn = %self.conn, node_id = %msg.node_id, %kind, detail, "handler fault");
                Verdict::reject(Outcome::InternalError, detail)
            }
        }
    }

    /// Forward or reply according to `verdict`
    pub fn respond(&mut self, msg: &Message, verdict: &Verdict) {
        let outcome = verdict.outcome;
        let reason = verdict.reason.as_deref().unwrap_or("");

        if outcome.is_success() {
            self.persist(msg, outcome);
            let targets = {
                let cx = HandlerCx {
                    ctx: &self.ctx,
                    conn: &self.conn,
                    claimed: &mut self.claimed,
                    now: self.ctx.clock.now(),
                };
                self.handler.targets(&cx, msg, outcome)
            };
            if targets.is_empty() {
                debug!(conn = %self.conn, node_id = %msg.node_id, %outcome, "no peers to forward to");
            }
            for target in &targets {
                self.ctx.send(target, msg);
            }
            return;
        }

        match outcome {
            Outcome::IdError if self.role() == Role::Node => {
                warn!(conn = %self.conn, node_id = %msg.node_id, reason, "node message declined");
            }
            Outcome::IdError | Outcome::ResponseIdError | Outcome::InvalidClient | Outcome::InvalidTasking => {
                warn!(conn = %self.conn, node_id = %msg.node_id, %outcome, reason, "message refused; replying to sender");
                let reply = self.reply_for(msg, outcome, reason);
                self.ctx.send(&self.conn, &reply);
            }
            Outcome::SensorTaskDropped => {
                info!(conn = %self.conn, node_id = %msg.node_id, target = msg.target_id(), reason, "task dropped by arbitration");
            }
            _ => {
                warn!(conn = %self.conn, node_id = %msg.node_id, %outcome, reason, "message dropped");
            }
        }
    }

    /// Classify, count and respond
    pub fn process(&mut self, msg: &Message) -> Outcome {
        let verdict = self.classify(msg);
        self.ctx.monitor.increment_count(verdict.outcome);
        debug!(conn = %self.conn, role = %self.role(), node_id = %msg.node_id, outcome = %verdict.outcome, "classified");
        self.respond(msg, &verdict);
        verdict.outcome
    }

    fn reply_for(&self, msg: &Message, outcome: Outcome, reason: &str) -> Message {
        if let (Outcome::IdError, Some(Content::Task(task))) = (outcome, &msg.content) {
            return Message::task_rejected(msg.target_id(), msg.node_id.clone(), task.task_id.clone(), reason);
        }
        let echo = match msg.to_echo() {
            Ok(echo) => Some(echo),
            Err(e) => {
                warn!(error = %e, "failed to encode echo");
                None
            }
        };
        Message::error(
            self.ctx.settings.agent_id.clone(),
            msg.node_id.clone(),
            vec![format!("{outcome}: {reason}")],
            echo,
        )
    }

    fn persist(&self, msg: &Message, outcome: Outcome) {
        let sink = &self.ctx.persistence;
        match outcome {
            Outcome::Registration => sink.record_registration(msg),
            Outcome::Status => sink.record_status(msg),
            Outcome::Detection => sink.record_detection(msg),
            Outcome::Alert => sink.record_alert(msg),
            Outcome::Task => sink.record_task(msg),
            Outcome::TaskAck => sink.record_task_ack(msg),
            Outcome::AlertResponse => sink.record_alert_ack(msg),
            _ => {}
        }
    }
}

impl std::fmt::Debug for ProtocolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRouter")
            .field("conn", &self.conn)
            .field("role", &self.role())
            .field("claimed", &self.claimed)
            .finish()
    }
}

pub(crate) fn panic_message(cause: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Rule helpers shared by the role handlers
pub(crate) mod rules {
    use super::*;

    /// Outcome for a schema failure on `role`
    pub fn invalid_outcome(role: Role) -> Outcome {
        match role {
            Role::Node => Outcome::InvalidClient,
            Role::Tasking | Role::Operator => Outcome::InvalidTasking,
        }
    }

    /// Run the validator
    pub fn validate(cx: &HandlerCx<'_>, role: Role, msg: &Message, kind: ContentKind) -> Result<(), Verdict> {
        let report = cx.ctx.validator.validate(msg, kind);
        if report.is_valid() {
            Ok(())
        } else {
            Err(Verdict::reject(invalid_outcome(role), report.summary()))
        }
    }

    /// Enforce sender cardinality on the tasking and operator channels
    pub fn claim_sender(cx: &mut HandlerCx<'_>, role: Role, node_id: &str) -> Result<(), Verdict> {
        if cx.claimed.contains(node_id) {
            return Ok(());
        }
        if cx.ctx.settings.cardinality(role) == IdentityCardinality::Single {
            if let Some(existing) = cx.claimed.iter().next() {
                return Err(Verdict::reject(
                    Outcome::IdError,
                    format!("connection already identified as {existing}; {node_id} refused"),
                ));
            }
        }
        cx.claimed.insert(node_id.to_string());
        Ok(())
    }

    /// Live connection of the node a message addresses
    pub fn node_connection(cx: &HandlerCx<'_>, msg: &Message) -> Option<ConnectionId> {
        cx.ctx.registry.lookup_connection(msg.target_id())
    }

    /// Reason used when a node cannot be resolved
    pub fn not_registered(node_id: &str) -> String {
        format!("{node_id} not registered")
    }

    /// `node`, then every live connection for each of `roles`, without duplicates
    pub fn fan_out(cx: &HandlerCx<'_>, node: Option<ConnectionId>, roles: &[Role]) -> Vec<ConnectionId> {
        let mut targets: Vec<ConnectionId> = node.into_iter().collect();
        for role in roles {
            for conn in cx.ctx.peers.connections(*role) {
                if &conn != cx.conn && !targets.contains(&conn) {
                    targets.push(conn);
                }
            }
        }
        targets
    }
}
