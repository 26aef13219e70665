//! Tasking-authority rules

use super::rules;
use super::{HandlerCx, RoleHandler, Verdict};
use crate::outcome::Outcome;
use crate::transport::{ConnectionId, Role};
use dataagent_protocol::{AlertAck, ContentKind, ErrorMessage, Message, RegistrationAck, Task};

/// Rules for the tasking authority channel
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskingFacing;

const SUPPORTED: &[ContentKind] = &[
    ContentKind::Task,
    ContentKind::RegistrationAck,
    ContentKind::AlertAck,
    ContentKind::Error,
];

impl TaskingFacing {
    /// RegistrationAck, AlertAck and Error: relay to the addressed node
    fn response(&self, cx: &mut HandlerCx<'_>, msg: &Message, kind: ContentKind) -> Verdict {
        if let Err(verdict) = rules::validate(cx, Role::Tasking, msg, kind) {
            return verdict;
        }
        if let Err(verdict) = rules::claim_sender(cx, Role::Tasking, &msg.node_id) {
            return verdict;
        }
        if rules::node_connection(cx, msg).is_none() {
            return Verdict::reject(Outcome::ResponseIdError, rules::not_registered(msg.target_id()));
        }
        Verdict::accept(kind)
    }
}

impl RoleHandler for TaskingFacing {
    fn role(&self) -> Role {
        Role::Tasking
    }

    fn supported(&self) -> &'static [ContentKind] {
        SUPPORTED
    }

    fn on_task(&self, cx: &mut HandlerCx<'_>, msg: &Message, _payload: &Task) -> Verdict {
        if let Err(verdict) = rules::validate(cx, Role::Tasking, msg, ContentKind::Task) {
            return verdict;
        }
        if let Err(verdict) = rules::claim_sender(cx, Role::Tasking, &msg.node_id) {
            return verdict;
        }
        let target = msg.target_id();
        if !cx.ctx.arbiter.authority_has_control(target) {
            return Verdict::reject(
                Outcome::SensorTaskDropped,
                format!("{target} is under operator console control"),
            );
        }
        if rules::node_connection(cx, msg).is_none() {
            return Verdict::reject(Outcome::IdError, rules::not_registered(target));
        }
        Verdict::accept(ContentKind::Task)
    }

    fn on_registration_ack(&self, cx: &mut HandlerCx<'_>, msg: &Message, _payload: &RegistrationAck) -> Verdict {
        self.response(cx, msg, ContentKind::RegistrationAck)
    }

    fn on_alert_ack(&self, cx: &mut HandlerCx<'_>, msg: &Message, _payload: &AlertAck) -> Verdict {
        self.response(cx, msg, ContentKind::AlertAck)
    }

    fn on_error(&self, cx: &mut HandlerCx<'_>, msg: &Message, _payload: &ErrorMessage) -> Verdict {
        self.response(cx, msg, ContentKind::Error)
    }

    fn targets(&self, cx: &HandlerCx<'_>, msg: &Message, _outcome: Outcome) -> Vec<ConnectionId> {
        rules::fan_out(cx, rules::node_connection(cx, msg), &[Role::Operator])
    }
}
