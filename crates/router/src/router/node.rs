//! Node-facing rules
//!
//! Nodes register, then report. Reports are accepted from a NodeId that is
//! bound now or was seen within the reconnection window; a report arriving
//! on a new connection inside the window rebinds the id to that connection.

use super::rules;
use super::{HandlerCx, RoleHandler, Verdict};
use crate::outcome::Outcome;
use crate::transport::{ConnectionId, Role};
use dataagent_protocol::{
    Alert, ContentKind, DetectionReport, ErrorMessage, Message, Registration, StatusReport, TaskAck,
};
use tracing::{debug, info};

/// Rules for the sensor channel
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeFacing;

const SUPPORTED: &[ContentKind] = &[
    ContentKind::Registration,
    ContentKind::StatusReport,
    ContentKind::DetectionReport,
    ContentKind::Alert,
    ContentKind::TaskAck,
    ContentKind::Error,
];

impl NodeFacing {
    /// Shared path for StatusReport, DetectionReport and Alert
    fn report(&self, cx: &mut HandlerCx<'_>, msg: &Message, kind: ContentKind) -> Verdict {
        if let Err(verdict) = rules::validate(cx, Role::Node, msg, kind) {
            return verdict;
        }
        let node_id = msg.node_id.as_str();

        match cx.ctx.registry.lookup_connection(node_id) {
            Some(_) => {}
            None if cx.ctx.tracker.is_recent(node_id, cx.now, cx.ctx.settings.reconnection_timeout) => {
                if let Err(e) = cx.ctx.registry.register(cx.conn, node_id) {
                    return Verdict::reject(Outcome::IdError, e.to_string());
                }
                cx.claimed.insert(node_id.to_string());
                info!(conn = %cx.conn, node_id, "node resumed within reconnection window");
            }
            None => return Verdict::reject(Outcome::IdError, rules::not_registered(node_id)),
        }

        cx.ctx.tracker.touch(node_id, cx.now);
        Verdict::accept(kind)
    }
}

impl RoleHandler for NodeFacing {
    fn role(&self) -> Role {
        Role::Node
    }

    fn supported(&self) -> &'static [ContentKind] {
        SUPPORTED
    }

    fn on_registration(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &Registration) -> Verdict {
        if let Err(verdict) = rules::validate(cx, Role::Node, msg, ContentKind::Registration) {
            return verdict;
        }
        let node_id = msg.node_id.as_str();
        if let Err(e) = cx.ctx.registry.register(cx.conn, node_id) {
            return Verdict::reject(Outcome::IdError, e.to_string());
        }

        cx.claimed.insert(node_id.to_string());
        cx.ctx.tracker.touch(node_id, cx.now);
        cx.ctx.registrations.store(msg);
        info!(conn = %cx.conn, node_id, node_type = %payload.node_type, "node registered");
        Verdict::accept(ContentKind::Registration)
    }

    fn on_status(&self, cx: &mut HandlerCx<'_>, msg: &Message, _payload: &StatusReport) -> Verdict {
        self.report(cx, msg, ContentKind::StatusReport)
    }

    fn on_detection(&self, cx: &mut HandlerCx<'_>, msg: &Message, _payload: &DetectionReport) -> Verdict {
        self.report(cx, msg, ContentKind::DetectionReport)
    }

    fn on_alert(&self, cx: &mut HandlerCx<'_>, msg: &Message, _payload: &Alert) -> Verdict {
        self.report(cx, msg, ContentKind::Alert)
    }

    fn on_task_ack(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &TaskAck) -> Verdict {
        if let Err(verdict) = rules::validate(cx, Role::Node, msg, ContentKind::TaskAck) {
            return verdict;
        }
        debug!(node_id = %msg.node_id, task_id = %payload.task_id, status = ?payload.status, "task acknowledged");
        Verdict::accept(ContentKind::TaskAck)
    }

    fn on_error(&self, cx: &mut HandlerCx<'_>, msg: &Message, _payload: &ErrorMessage) -> Verdict {
        match rules::validate(cx, Role::Node, msg, ContentKind::Error) {
            Ok(()) => Verdict::accept(ContentKind::Error),
            Err(verdict) => verdict,
        }
    }

    fn targets(&self, cx: &HandlerCx<'_>, _msg: &Message, _outcome: Outcome) -> Vec<ConnectionId> {
        rules::fan_out(cx, None, &[Role::Tasking, Role::Operator])
    }
}
