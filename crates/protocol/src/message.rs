//! Message envelope and content payloads
//!
//! A [`Message`] is one protocol exchange: the sender's NodeId, an optional
//! destination, a timestamp and at most one [`Content`] variant. A message with
//! no content is representable on purpose; the router classifies it as unknown.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identity of a sensor, tasking authority or operator console
pub type NodeId = String;

/// Protocol envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sender identity
    #[serde(default)]
    pub node_id: NodeId,
    /// Intended recipient, when the sender addresses one explicitly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<NodeId>,
    /// Origination time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Exactly one typed payload, or none
    ///
    /// An unrecognized tag decodes as `None`; a recognized tag with a
    /// malformed payload is a decode error.
    #[serde(default, deserialize_with = "content_or_unknown")]
    pub content: Option<Content>,
}

fn content_or_unknown<'de, D>(deserializer: D) -> Result<Option<Content>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let is_known = |tag: &str| ContentKind::ALL.iter().any(|kind| kind.as_str() == tag);
    let recognized = match &value {
        serde_json::Value::Object(map) => map.keys().any(|tag| is_known(tag)),
        serde_json::Value::String(tag) => is_known(tag),
        _ => false,
    };
    if !recognized {
        return Ok(None);
    }
    Content::deserialize(value)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(node_id: impl Into<NodeId>, content: Content) -> Self {
        Self {
            node_id: node_id.into(),
            destination_id: None,
            timestamp: Utc::now(),
            content: Some(content),
        }
    }

    /// Create a message with no content variant set
    pub fn empty(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            destination_id: None,
            timestamp: Utc::now(),
            content: None,
        }
    }

    /// Address the message to a specific node
    pub fn with_destination(mut self, destination_id: impl Into<NodeId>) -> Self {
        self.destination_id = Some(destination_id.into());
        self
    }

    /// Override the origination time
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Kind of the populated content variant
    pub fn kind(&self) -> Option<ContentKind> {
        self.content.as_ref().map(Content::kind)
    }

    /// Destination if set, else the sender id
    ///
    /// Tasking traffic may address a node through `node_id` when no explicit
    /// destination is given.
    pub fn target_id(&self) -> &str {
        self.destination_id.as_deref().unwrap_or(&self.node_id)
    }

    /// Base64 of the JSON encoding, used as the opaque echo in Error replies
    pub fn to_echo(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    /// Build an Error reply from `from` to `to` echoing the offending message
    pub fn error(
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        errors: Vec<String>,
        packet: Option<String>,
    ) -> Self {
        Message::new(from, Content::Error(ErrorMessage { errors, packet })).with_destination(to)
    }

    /// Build a rejected TaskAck for `task_id`, as if `node` declined the task
    pub fn task_rejected(
        node: impl Into<NodeId>,
        to: impl Into<NodeId>,
        task_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Message::new(
            node,
            Content::TaskAck(TaskAck {
                task_id: task_id.into(),
                status: TaskStatus::Rejected,
                reasons: vec![reason.into()],
            }),
        )
        .with_destination(to)
    }
}

/// Typed message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Content {
    /// Node identity announcement
    Registration(Registration),
    /// Authority response to a registration
    RegistrationAck(RegistrationAck),
    /// Periodic node health report
    StatusReport(StatusReport),
    /// Object detection report
    DetectionReport(DetectionReport),
    /// Node-raised alert
    Alert(Alert),
    /// Response to an alert
    AlertAck(AlertAck),
    /// Tasking request
    Task(Task),
    /// Task acknowledgement
    TaskAck(TaskAck),
    /// Diagnostic error
    Error(ErrorMessage),
}

impl Content {
    /// Fieldless discriminant of this payload
    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Registration(_) => ContentKind::Registration,
            Content::RegistrationAck(_) => ContentKind::RegistrationAck,
            Content::StatusReport(_) => ContentKind::StatusReport,
            Content::DetectionReport(_) => ContentKind::DetectionReport,
            Content::Alert(_) => ContentKind::Alert,
            Content::AlertAck(_) => ContentKind::AlertAck,
            Content::Task(_) => ContentKind::Task,
            Content::TaskAck(_) => ContentKind::TaskAck,
            Content::Error(_) => ContentKind::Error,
        }
    }
}

/// Content variant discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// [`Content::Registration`]
    Registration,
    /// [`Content::RegistrationAck`]
    RegistrationAck,
    /// [`Content::StatusReport`]
    StatusReport,
    /// [`Content::DetectionReport`]
    DetectionReport,
    /// [`Content::Alert`]
    Alert,
    /// [`Content::AlertAck`]
    AlertAck,
    /// [`Content::Task`]
    Task,
    /// [`Content::TaskAck`]
    TaskAck,
    /// [`Content::Error`]
    Error,
}

impl ContentKind {
    /// Every content kind
    pub const ALL: [ContentKind; 9] = [
        ContentKind::Registration,
        ContentKind::RegistrationAck,
        ContentKind::StatusReport,
        ContentKind::DetectionReport,
        ContentKind::Alert,
        ContentKind::AlertAck,
        ContentKind::Task,
        ContentKind::TaskAck,
        ContentKind::Error,
    ];

    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Registration => "registration",
            ContentKind::RegistrationAck => "registration_ack",
            ContentKind::StatusReport => "status_report",
            ContentKind::DetectionReport => "detection_report",
            ContentKind::Alert => "alert",
            ContentKind::AlertAck => "alert_ack",
            ContentKind::Task => "task",
            ContentKind::TaskAck => "task_ack",
            ContentKind::Error => "error",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Sensor type, e.g. "radar" or "eo/ir"
    pub node_type: String,
    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Advertised capabilities
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Expected status report period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_secs: Option<u32>,
}

impl Registration {
    /// Registration with only a node type
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            name: None,
            capabilities: Vec::new(),
            heartbeat_interval_secs: None,
        }
    }
}

/// Registration acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationAck {
    /// Whether the authority accepted the node
    pub acceptance: bool,
    /// Reasons for rejection
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Overall node health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    /// Nominal
    Ok,
    /// Degraded
    Warning,
    /// Faulted
    Error,
    /// Node is going offline
    Goodbye,
}

/// Status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Report identifier
    pub report_id: String,
    /// Health summary
    pub system: SystemStatus,
    /// Free-text detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    /// Current operating mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl StatusReport {
    /// Status report with no detail
    pub fn new(report_id: impl Into<String>, system: SystemStatus) -> Self {
        Self {
            report_id: report_id.into(),
            system,
            info: None,
            mode: None,
        }
    }
}

/// Cartesian or geodetic position, per the sensor's configured frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// X / longitude
    pub x: f64,
    /// Y / latitude
    pub y: f64,
    /// Z / altitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

/// Detection report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Report identifier
    pub report_id: String,
    /// Track identifier
    pub object_id: String,
    /// Object position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Object class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    /// Classification confidence in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl DetectionReport {
    /// Detection with only identifiers
    pub fn new(report_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            report_id: report_id.into(),
            object_id: object_id.into(),
            location: None,
            classification: None,
            confidence: None,
        }
    }
}

/// Alert raised by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert identifier
    pub alert_id: String,
    /// Alert category
    pub alert_type: String,
    /// Alert lifecycle status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

/// Alert response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAckStatus {
    /// Alert acknowledged
    Accepted,
    /// Alert dismissed
    Rejected,
    /// Alert withdrawn
    Cancelled,
}

/// Response to an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAck {
    /// Alert being answered
    pub alert_id: String,
    /// Response status
    pub status: AlertAckStatus,
    /// Supporting reasons
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Task control verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskControl {
    /// Begin the task
    Start,
    /// Abort the task
    Stop,
    /// Suspend the task
    Pause,
    /// Revert to the node's default behaviour
    Default,
}

/// Manual control request carried in a Task from an operator console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Console takes manual control of the destination node
    Take,
    /// Console hands control back to the tasking authority
    Release,
}

/// Tasking request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier
    pub task_id: String,
    /// Control verb
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<TaskControl>,
    /// Free-text request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

impl Task {
    /// Task with a control verb
    pub fn new(task_id: impl Into<String>, control: TaskControl) -> Self {
        Self {
            task_id: task_id.into(),
            control: Some(control),
            request: None,
        }
    }

    /// Task carrying a free-text request
    pub fn request(task_id: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            control: None,
            request: Some(request.into()),
        }
    }

    /// Whether this is a "Take Control" / "Release Control" request
    pub fn control_request(&self) -> Option<ControlRequest> {
        let request = self.request.as_deref()?.trim();
        if request.eq_ignore_ascii_case("take control") {
            Some(ControlRequest::Take)
        } else if request.eq_ignore_ascii_case("release control") {
            Some(ControlRequest::Release)
        } else {
            None
        }
    }
}

/// Task acknowledgement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task accepted
    Accepted,
    /// Task declined
    Rejected,
    /// Task finished
    Completed,
    /// Task could not be carried out
    Failed,
}

/// Task acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAck {
    /// Task being acknowledged
    pub task_id: String,
    /// Outcome of the task
    pub status: TaskStatus,
    /// Supporting reasons
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Diagnostic error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Human-readable error strings
    pub errors: Vec<String>,
    /// Base64 echo of the offending message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet: Option<String>,
}
