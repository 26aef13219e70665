//! Core functionality for the Data Agent protocol gateway.
//!
//! This crate provides the configuration model, logging bootstrap and the
//! core error type shared by the protocol, router and service crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    AgentConfig, CardinalityConfig, Config, DeploymentMode, EndpointConfig, IdentityCardinality,
    ListenerConfig, LoggingConfig, NodeRouterMode, PersistenceConfig, SilenceConfig,
};
pub use error::{CoreError, Result};
