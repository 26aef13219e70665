//! Data Agent router
//!
//! Classification, identity management, permission arbitration and
//! forwarding for the Data Agent protocol gateway.
//!
//! # Architecture
//!
//! Transport callbacks enter through the [`Dispatcher`]:
//! 1. Raw bytes are framed and decoded; malformed records stop here
//! 2. The connection's [`ProtocolRouter`] classifies the message through its
//!    role's [`RoleHandler`] into an [`Outcome`]
//! 3. Success outcomes are forwarded to the role's peers; identity and
//!    schema failures get a synthesized reply; everything else is dropped
//! 4. The [`MessageMonitor`] counts every outcome
//!
//! Shared state lives in one [`RouterContext`], built at start-up and passed
//! to every router:
//!
//! - [`ConnectionRegistry`]: NodeId ↔ connection bindings
//! - [`ReconnectionTracker`]: last-activity times for the reconnection window
//! - [`TaskPermissionArbiter`]: tasking authority vs operator console control
//!
//! # Examples
//!
//! ```
//! use dataagent_router::{ConnectionId, Dispatcher, DispatcherConfig, Outcome, Role, RouterContext, Transport};
//! use dataagent_protocol::{Content, Message, Registration};
//! use std::sync::Arc;
//!
//! struct Discard;
//!
//! impl Transport for Discard {
//!     fn send(&self, _conn: &ConnectionId, _message: &Message) -> bool {
//!         true
//!     }
//! }
//!
//! let ctx = RouterContext::builder(Arc::new(Discard)).build();
//! let dispatcher = Dispatcher::new(ctx, DispatcherConfig::default());
//!
//! let conn = ConnectionId::generate();
//! dispatcher.on_connected(&conn, Role::Node);
//! let registration = Message::new("NODE-A", Content::Registration(Registration::new("radar")));
//! assert_eq!(
//!     dispatcher.on_message(&conn, Role::Node, Some(registration)),
//!     Outcome::Registration
//! );
//! ```

#![warn(missing_docs)]

pub mod clock;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod monitor;
pub mod outcome;
pub mod permission;
pub mod persistence;
pub mod reconnection;
pub mod registry;
pub mod router;
pub mod transport;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{PeerDirectory, RegistrationCache, RouterContext, RouterContextBuilder, RouterSettings};
pub use dispatcher::{Dispatcher, DispatcherConfig, LivenessHandle, SilenceThresholds};
pub use error::{PersistenceError, RegistryError};
pub use monitor::{Histogram, HistogramSummary, LatencyChannel, MessageMonitor};
pub use outcome::Outcome;
pub use permission::TaskPermissionArbiter;
pub use persistence::{NullSink, PersistenceSink, SqliteSink};
pub use reconnection::ReconnectionTracker;
pub use registry::ConnectionRegistry;
pub use router::{HandlerCx, NodeFacing, OperatorFacing, ProtocolRouter, RoleHandler, TaskingFacing, Verdict};
pub use transport::{ConnectionId, Role, Transport};
