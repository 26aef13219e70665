//! Data Agent wire protocol
//!
//! Message model, validation contract and line framing for the sensor
//! interface protocol relayed by the Data Agent. Every message carries the
//! sender's NodeId and at most one typed content variant:
//!
//! - **Registration / RegistrationAck**: node identity handshake
//! - **StatusReport / DetectionReport / Alert**: node-originated reports
//! - **Task / TaskAck**: tasking requests and their acknowledgements
//! - **AlertAck**: responses to alerts
//! - **Error**: diagnostic reply carrying an echo of the offending message
//!
//! # Examples
//!
//! ```
//! use dataagent_protocol::{codec, Content, Message, StatusReport, SystemStatus};
//!
//! let msg = Message::new(
//!     "NODE-A",
//!     Content::StatusReport(StatusReport::new("status-1", SystemStatus::Ok)),
//! );
//! let line = codec::encode(&msg).unwrap();
//! assert_eq!(codec::decode(&line).unwrap(), msg);
//! ```

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod message;
pub mod validation;

pub use codec::{FrameBuffer, MAX_FRAME_LEN};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    Alert, AlertAck, AlertAckStatus, Content, ContentKind, ControlRequest, DetectionReport,
    ErrorMessage, Location, Message, NodeId, Registration, RegistrationAck, StatusReport,
    SystemStatus, Task, TaskAck, TaskControl, TaskStatus,
};
pub use validation::{SchemaValidator, ValidationReport, Validator};
