use clap::Parser;
use dataagent_core::{Config, DeploymentMode};
use serde::Serialize;
use std::path::PathBuf;

pub const PROTOCOL_VERSION: u32 = 1;

/// Data Agent protocol gateway
#[derive(Debug, Parser)]
#[command(name = "data-agent", version, about)]
pub struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Deployment side, overriding the configuration file
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    pub mode: Option<DeploymentMode>,

    /// NodeId of the tasking authority, overriding the configuration file
    #[arg(long, value_name = "ID")]
    pub authority_id: Option<String>,

    /// Print a JSON version handshake and exit
    #[arg(long)]
    pub version_json: bool,
}

fn parse_mode(raw: &str) -> Result<DeploymentMode, String> {
    raw.parse()
}

impl Cli {
    /// Layer command-line overrides onto `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.agent.mode = mode;
        }
        if let Some(id) = &self.authority_id {
            config.agent.authority_id = id.clone();
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionHandshake {
    pub version: &'static str,
    pub protocol_version: u32,
}

impl VersionHandshake {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}
