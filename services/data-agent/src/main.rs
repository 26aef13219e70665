//! Data Agent gateway process
//!
//! Loads configuration, builds the shared routing state once and serves the
//! node, tasking and operator endpoints until Ctrl-C.

mod cli;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, VersionHandshake};
use dataagent_core::{logging, Config, DeploymentMode, ListenerConfig};
use dataagent_router::{
    Dispatcher, DispatcherConfig, MessageMonitor, NullSink, PersistenceSink, Role, RouterContext,
    RouterSettings, SqliteSink,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use transport::{serve_connection, TcpTransport};

const OUTBOUND_RETRY_BASE: Duration = Duration::from_secs(2);
const OUTBOUND_RETRY_MAX: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version_json {
        println!("{}", serde_json::to_string(&VersionHandshake::current())?);
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default_config(),
    };
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    logging::init_with(&config.logging);
    info!(
        mode = %config.agent.mode,
        authority_id = %config.agent.authority_id,
        "Data Agent starting"
    );

    let transport = Arc::new(TcpTransport::new());
    let monitor = Arc::new(MessageMonitor::new());

    let sqlite = if config.persistence.enabled {
        let sink = SqliteSink::open(&config.persistence.path, monitor.clone())
            .with_context(|| format!("opening {}", config.persistence.path.display()))?;
        Some(Arc::new(sink))
    } else {
        None
    };
    let persistence: Arc<dyn PersistenceSink> = match &sqlite {
        Some(sink) => sink.clone() as Arc<dyn PersistenceSink>,
        None => Arc::new(NullSink),
    };

    let ctx = RouterContext::builder(transport.clone())
        .settings(RouterSettings::from(&config.agent))
        .monitor(monitor)
        .persistence(persistence)
        .build();
    let dispatcher = Arc::new(Dispatcher::new(ctx, DispatcherConfig::from(&config.agent)));
    let liveness = dispatcher
        .spawn_liveness(config.agent.liveness_interval())
        .context("starting liveness monitor")?;

    let mut endpoints = JoinSet::new();
    endpoints.spawn(listen(config.endpoints.node.clone(), Role::Node, dispatcher.clone(), transport.clone()));

    match config.agent.mode {
        DeploymentMode::AuthoritySide => {
            endpoints.spawn(listen(
                config.endpoints.tasking.clone(),
                Role::Tasking,
                dispatcher.clone(),
                transport.clone(),
            ));
        }
        DeploymentMode::NodeSide => {
            endpoints.spawn(connect_tasking(
                config.endpoints.tasking.socket_addr(),
                dispatcher.clone(),
                transport.clone(),
            ));
        }
    }

    if config.endpoints.operator.is_enabled() {
        endpoints.spawn(listen(
            config.endpoints.operator.clone(),
            Role::Operator,
            dispatcher.clone(),
            transport.clone(),
        ));
    } else {
        info!("operator endpoint disabled");
    }

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            info!("shutdown requested");
            Ok(())
        }
        Some(joined) = endpoints.join_next() => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(anyhow::anyhow!("endpoint task failed: {e}")),
        },
    };

    endpoints.abort_all();
    liveness.stop();
    if let Some(sink) = sqlite {
        sink.shutdown();
    }
    info!(summary = %dispatcher.context().monitor.print(), "Data Agent stopped");

    if let Err(e) = &result {
        error!(error = %e, "endpoint failure");
    }
    result
}

async fn listen(
    endpoint: ListenerConfig,
    role: Role,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<TcpTransport>,
) -> Result<()> {
    let addr = endpoint.socket_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {role} endpoint on {addr}"))?;
    info!(%role, %addr, "listening");

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .with_context(|| format!("accepting on {role} endpoint"))?;
        tokio::spawn(serve_connection(stream, role, dispatcher.clone(), transport.clone()));
    }
}

/// Outbound tasking link for node-side deployments; reconnects forever
async fn connect_tasking(addr: String, dispatcher: Arc<Dispatcher>, transport: Arc<TcpTransport>) -> Result<()> {
    let mut backoff = OUTBOUND_RETRY_BASE;
    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                info!(%addr, "connected to tasking authority");
                backoff = OUTBOUND_RETRY_BASE;
                serve_connection(stream, Role::Tasking, dispatcher.clone(), transport.clone()).await;
                warn!(%addr, "tasking link lost");
            }
            Err(e) => {
                warn!(%addr, error = %e, retry_in_secs = backoff.as_secs(), "tasking authority unreachable");
            }
        }

        let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4);
        tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
        backoff = (backoff * 2).min(OUTBOUND_RETRY_MAX);
    }
}
