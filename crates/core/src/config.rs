//! Configuration management for the Data Agent.
//!
//! The agent is configured from a TOML file. Every section has defaults, so a
//! file only needs to name what differs from [`Config::default_config`].

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub endpoints: EndpointConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// Which side of the tasking link this gateway sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    /// Tasking authority dials in; the tasking endpoint is a listener.
    AuthoritySide,
    /// Gateway dials out to the tasking authority and reconnects on loss.
    NodeSide,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMode::AuthoritySide => write!(f, "authority-side"),
            DeploymentMode::NodeSide => write!(f, "node-side"),
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "authority-side" | "authority" => Ok(DeploymentMode::AuthoritySide),
            "node-side" | "node" => Ok(DeploymentMode::NodeSide),
            other => Err(format!("unknown deployment mode: {other}")),
        }
    }
}

/// How many NodeIds a single connection may claim on a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityCardinality {
    /// One NodeId per connection; a second distinct id is an identity error.
    Single,
    /// A connection may carry traffic for several NodeIds.
    Multiple,
}

/// Router instantiation strategy for the node-facing listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRouterMode {
    /// One router per node connection.
    PerConnection,
    /// One router shared by the single expected node-side peer.
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalityConfig {
    pub node: IdentityCardinality,
    pub tasking: IdentityCardinality,
    pub operator: IdentityCardinality,
}

impl Default for CardinalityConfig {
    fn default() -> Self {
        Self {
            node: IdentityCardinality::Single,
            tasking: IdentityCardinality::Multiple,
            operator: IdentityCardinality::Single,
        }
    }
}

/// Per-role silence thresholds in seconds. Zero disables the check for that role.
///
/// Tasking and operator links can be receive-only for long stretches, so only
/// node connections are checked by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SilenceConfig {
    pub node: u64,
    pub tasking: u64,
    pub operator: u64,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            node: 120,
            tasking: 0,
            operator: 0,
        }
    }
}

impl SilenceConfig {
    /// `secs` as a threshold, `None` when zero.
    pub fn threshold(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub mode: DeploymentMode,
    /// NodeId of the tasking authority; also stamped on messages the agent originates.
    pub authority_id: String,
    /// Window after a connection loss during which a node's registration is still honoured.
    pub reconnection_timeout_secs: u64,
    pub liveness_interval_secs: u64,
    /// Connections silent for longer than their role's threshold are treated as lost.
    pub silence_threshold_secs: SilenceConfig,
    pub node_router_mode: NodeRouterMode,
    pub cardinality: CardinalityConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::AuthoritySide,
            authority_id: "authority-001".to_string(),
            reconnection_timeout_secs: 60,
            liveness_interval_secs: 5,
            silence_threshold_secs: SilenceConfig::default(),
            node_router_mode: NodeRouterMode::PerConnection,
            cardinality: CardinalityConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn reconnection_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnection_timeout_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub address: String,
    /// Zero disables the endpoint.
    pub port: u16,
}

impl ListenerConfig {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.port != 0
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub node: ListenerConfig,
    /// Listener in authority-side mode, outbound target in node-side mode.
    pub tasking: ListenerConfig,
    pub operator: ListenerConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            node: ListenerConfig::new("0.0.0.0", 12000),
            tasking: ListenerConfig::new("0.0.0.0", 14000),
            operator: ListenerConfig::new("0.0.0.0", 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("data-agent.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Reject configurations the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.authority_id.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "agent.authority_id must not be empty".to_string(),
            ));
        }
        if !self.endpoints.node.is_enabled() {
            return Err(CoreError::InvalidConfig(
                "endpoints.node.port must be non-zero".to_string(),
            ));
        }
        if !self.endpoints.tasking.is_enabled() {
            return Err(CoreError::InvalidConfig(
                "endpoints.tasking.port must be non-zero".to_string(),
            ));
        }
        if self.agent.reconnection_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "agent.reconnection_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.agent.liveness_interval_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "agent.liveness_interval_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
