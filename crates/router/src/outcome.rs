//! Classification outcomes
//!
//! Every inbound message resolves to exactly one [`Outcome`]. The outcome
//! drives forwarding, diagnostic replies and the monitor's counters.

use dataagent_protocol::ContentKind;
use std::fmt;

/// Result of classifying and validating one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Registration accepted
    Registration,
    /// Registration acknowledgement relayed
    RegistrationAck,
    /// Status report accepted
    Status,
    /// Detection report accepted
    Detection,
    /// Alert accepted
    Alert,
    /// Alert response relayed
    AlertResponse,
    /// Task accepted
    Task,
    /// Task acknowledgement relayed
    TaskAck,
    /// Error message relayed
    Error,
    /// Unknown or colliding NodeId
    IdError,
    /// Destination of a response could not be resolved
    ResponseIdError,
    /// Schema-invalid node-originated content
    InvalidClient,
    /// Schema-invalid tasking or operator content
    InvalidTasking,
    /// Unexpected fault while handling
    InternalError,
    /// Content variant not accepted on this role
    Unsupported,
    /// No content variant set
    Unknown,
    /// Task refused by permission arbitration
    SensorTaskDropped,
}

impl Outcome {
    /// Number of outcome values
    pub const COUNT: usize = 17;

    /// Every outcome, in counter order
    pub const ALL: [Outcome; Outcome::COUNT] = [
        Outcome::Registration,
        Outcome::RegistrationAck,
        Outcome::Status,
        Outcome::Detection,
        Outcome::Alert,
        Outcome::AlertResponse,
        Outcome::Task,
        Outcome::TaskAck,
        Outcome::Error,
        Outcome::IdError,
        Outcome::ResponseIdError,
        Outcome::InvalidClient,
        Outcome::InvalidTasking,
        Outcome::InternalError,
        Outcome::Unsupported,
        Outcome::Unknown,
        Outcome::SensorTaskDropped,
    ];

    /// Position in [`Outcome::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the message is forwarded verbatim
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Outcome::Registration
                | Outcome::RegistrationAck
                | Outcome::Status
                | Outcome::Detection
                | Outcome::Alert
                | Outcome::AlertResponse
                | Outcome::Task
                | Outcome::TaskAck
                | Outcome::Error
        )
    }

    /// Success outcome for a content kind
    pub fn accepted(kind: ContentKind) -> Outcome {
        match kind {
            ContentKind::Registration => Outcome::Registration,
            ContentKind::RegistrationAck => Outcome::RegistrationAck,
            ContentKind::StatusReport => Outcome::Status,
            ContentKind::DetectionReport => Outcome::Detection,
            ContentKind::Alert => Outcome::Alert,
            ContentKind::AlertAck => Outcome::AlertResponse,
            ContentKind::Task => Outcome::Task,
            ContentKind::TaskAck => Outcome::TaskAck,
            ContentKind::Error => Outcome::Error,
        }
    }

    /// Counter label
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Registration => "registration",
            Outcome::RegistrationAck => "registration_ack",
            Outcome::Status => "status",
            Outcome::Detection => "detection",
            Outcome::Alert => "alert",
            Outcome::AlertResponse => "alert_response",
            Outcome::Task => "task",
            Outcome::TaskAck => "task_ack",
            Outcome::Error => "error",
            Outcome::IdError => "id_error",
            Outcome::ResponseIdError => "response_id_error",
            Outcome::InvalidClient => "invalid_client",
            Outcome::InvalidTasking => "invalid_tasking",
            Outcome::InternalError => "internal_error",
            Outcome::Unsupported => "unsupported",
            Outcome::Unknown => "unknown",
            Outcome::SensorTaskDropped => "sensor_task_dropped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
