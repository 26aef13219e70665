//! Operator-console rules
//!
//! A console observes traffic and may take manual control of a node. While
//! it holds control, its Tasks reach the node and the authority's do not.

use super::rules;
use super::{HandlerCx, RoleHandler, Verdict};
use crate::outcome::Outcome;
use crate::transport::{ConnectionId, Role};
use dataagent_protocol::{AlertAck, Content, ContentKind, ControlRequest, Message, Task};

/// Rules for operator console channels
#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorFacing;

const SUPPORTED: &[ContentKind] = &[ContentKind::Task, ContentKind::AlertAck];

fn control_request(msg: &Message) -> Option<ControlRequest> {
    match &msg.content {
        Some(Content::Task(task)) => task.control_request(),
        _ => None,
    }
}

impl RoleHandler for OperatorFacing {
    fn role(&self) -> Role {
        Role::Operator
    }

    fn supported(&self) -> &'static [ContentKind] {
        SUPPORTED
    }

    fn on_task(&self, cx: &mut HandlerCx<'_>, msg: &Message, payload: &Task) -> Verdict {
        if let Err(verdict) = rules::validate(cx, Role::Operator, msg, ContentKind::Task) {
            return verdict;
        }
        if let Err(verdict) = rules::claim_sender(cx, Role::Operator, &msg.node_id) {
            return verdict;
        }
        let target = msg.target_id();

        match payload.control_request() {
            Some(ControlRequest::Take) => {
                cx.ctx.arbiter.take_control(target);
                Verdict::accept(ContentKind::Task)
            }
            Some(ControlRequest::Release) => {
                cx.ctx.arbiter.release_control(target);
                Verdict::accept(ContentKind::Task)
            }
            None => {
                if !cx.ctx.arbiter.console_should_forward(target) {
                    return Verdict::reject(
                        Outcome::SensorTaskDropped,
                        format!("operator console does not control {target}"),
                    );
                }
                if rules::node_connection(cx, msg).is_none() {
                    return Verdict::reject(Outcome::IdError, rules::not_registered(target));
                }
                Verdict::accept(ContentKind::Task)
            }
        }
    }

    fn on_alert_ack(&self, cx: &mut HandlerCx<'_>, msg: &Message, _payload: &AlertAck) -> Verdict {
        if let Err(verdict) = rules::validate(cx, Role::Operator, msg, ContentKind::AlertAck) {
            return verdict;
        }
        if let Err(verdict) = rules::claim_sender(cx, Role::Operator, &msg.node_id) {
            return verdict;
        }
        if rules::node_connection(cx, msg).is_none() {
            return Verdict::reject(Outcome::ResponseIdError, rules::not_registered(msg.target_id()));
        }
        Verdict::accept(ContentKind::AlertAck)
    }

    fn targets(&self, cx: &HandlerCx<'_>, msg: &Message, _outcome: Outcome) -> Vec<ConnectionId> {
        // Control requests inform the authority; the node never sees them
        if control_request(msg).is_some() {
            return rules::fan_out(cx, None, &[Role::Tasking]);
        }
        rules::fan_out(cx, rules::node_connection(cx, msg), &[Role::Tasking])
    }
}
