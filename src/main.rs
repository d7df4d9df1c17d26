//! `session-notifier`: run a logging session driver, or push notifications
//! to drivers through the notifier.

#![deny(unsafe_code)]

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use notifier_core::settings::load_settings_from_path;
use notifier_core::{HostPort, ResourceGrant, ResourceType, SessionHandle, StaticSessionRegistry};
use notifier_engine::SessionNotifier;
use notifier_telemetry::{init_telemetry, MetricsRecorder, TelemetryConfig};
use notifier_transport::{DriverServer, TcpDriverConnector};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::handlers::{LoggingClusterManager, LoggingDriverHandler};

#[derive(Debug, Parser)]
#[command(name = "session-notifier", about = "Session notification dispatcher")]
struct Cli {
    /// Default log level; RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: tracing::Level,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Listen for notifications and log them.
    Driver(DriverArgs),
    /// Send notifications to session drivers and wait for delivery.
    Notify(NotifyArgs),
}

#[derive(Debug, Args)]
struct DriverArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:7070")]
    listen: String,

    /// Reject every call for this session (repeatable).
    #[arg(long = "reject-session")]
    reject_sessions: Vec<SessionHandle>,
}

#[derive(Debug, Args)]
struct NotifyArgs {
    /// Notifier settings file (JSON). Missing file means defaults.
    #[arg(long, default_value = "notifier.json")]
    config: PathBuf,

    /// Known session and its driver address, `HANDLE=HOST:PORT` (repeatable).
    #[arg(long = "session", value_parser = parse_session)]
    sessions: Vec<(SessionHandle, HostPort)>,

    /// Grant one resource, `HANDLE:TYPE` (repeatable).
    #[arg(long = "grant", value_parser = parse_resource)]
    grants: Vec<(SessionHandle, ResourceType)>,

    /// Revoke one resource, `HANDLE:TYPE` (repeatable).
    #[arg(long = "revoke", value_parser = parse_resource)]
    revokes: Vec<(SessionHandle, ResourceType)>,

    /// Revoke without letting running work finish.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Report a dead node, `HANDLE:NODE` (repeatable).
    #[arg(long = "dead-node", value_parser = parse_dead_node)]
    dead_nodes: Vec<(SessionHandle, String)>,

    /// Node the granted resources live on.
    #[arg(long, default_value = "node-1")]
    node_name: String,

    /// Address of that node.
    #[arg(long, default_value = "127.0.0.1:50060")]
    node_address: HostPort,

    /// Give up waiting for delivery after this many seconds.
    #[arg(long, default_value_t = 10)]
    wait_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let telemetry = init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        json: cli.json_logs,
        ..TelemetryConfig::default()
    });

    match cli.command {
        Command::Driver(args) => run_driver(args).await,
        Command::Notify(args) => run_notify(args, telemetry.metrics()).await,
    }
}

async fn run_driver(args: DriverArgs) -> Result<()> {
    let cancel = CancellationToken::new();
    let handler = Arc::new(LoggingDriverHandler::rejecting(args.reject_sessions));
    let server = DriverServer::bind(&args.listen, handler, cancel.clone())
        .await
        .with_context(|| format!("failed to listen on {}", args.listen))?;
    info!(address = %server.local_addr(), "session driver ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    info!("shutting down");
    cancel.cancel();
    server.wait().await;
    Ok(())
}

async fn run_notify(args: NotifyArgs, metrics: Arc<MetricsRecorder>) -> Result<()> {
    let settings = load_settings_from_path(&args.config)
        .with_context(|| format!("failed to load settings from {}", args.config.display()))?;

    let registry = Arc::new(StaticSessionRegistry::new());
    for (handle, address) in &args.sessions {
        registry.register(handle.clone(), address.clone());
    }

    let notifier = SessionNotifier::start(
        &settings,
        registry,
        Arc::new(LoggingClusterManager),
        metrics.clone(),
        Arc::new(TcpDriverConnector::from_settings(&settings.transport)),
    )?;

    let mut next_id = 0u32;
    let mut grant = |resource_type: ResourceType| {
        next_id += 1;
        ResourceGrant::new(
            next_id,
            resource_type,
            args.node_name.clone(),
            args.node_address.clone(),
        )
    };

    for (handle, resource_type) in &args.grants {
        notifier.notify_grant_resource(handle, vec![grant(*resource_type)]);
    }
    for (handle, resource_type) in &args.revokes {
        notifier.notify_revoke_resource(handle, vec![grant(*resource_type)], args.force);
    }
    for (handle, node) in &args.dead_nodes {
        notifier.notify_dead_node(handle, node);
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.wait_secs);
    loop {
        let pending = notifier.num_pending_calls();
        metrics.gauge_set("notifier.calls.pending", &[], pending as f64);
        if pending == 0 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(pending, "gave up waiting for delivery");
            break;
        }
        tokio::time::sleep(settings.poll_interval()).await;
    }
    notifier.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    Ok(())
}

fn parse_session(s: &str) -> Result<(SessionHandle, HostPort), String> {
    let (handle, address) = s
        .split_once('=')
        .ok_or_else(|| format!("expected HANDLE=HOST:PORT, got {s}"))?;
    let handle = SessionHandle::new(handle).map_err(|e| e.to_string())?;
    Ok((handle, address.parse()?))
}

fn parse_resource(s: &str) -> Result<(SessionHandle, ResourceType), String> {
    let (handle, resource_type) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected HANDLE:TYPE, got {s}"))?;
    let handle = SessionHandle::new(handle).map_err(|e| e.to_string())?;
    Ok((handle, resource_type.parse()?))
}

fn parse_dead_node(s: &str) -> Result<(SessionHandle, String), String> {
    let (handle, node) = s
        .split_once(':')
        .ok_or_else(|| format!("expected HANDLE:NODE, got {s}"))?;
    if node.is_empty() {
        return Err("node must not be empty".into());
    }
    let handle = SessionHandle::new(handle).map_err(|e| e.to_string())?;
    Ok((handle, node.to_string()))
}
