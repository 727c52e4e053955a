//! proxy-gateway
//!
//! Local proxy gateway: HTTP, SOCKS5 (TCP + UDP) and redirect inbounds,
//! reconfigured at runtime through a file reload or the control API.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──▶ loader ──▶ ConfigSnapshot ──┐
//!   (watch / SIGHUP)                            │
//!                                               ▼
//!   control API ──PATCH/PUT──▶ executor (Users → General → Proxies → Rules
//!        │                              → Dns → Hosts → Experimental)
//!        │                                      │
//!        │                                      ▼
//!        └──GET──▶ get_general ◀──── Runtime { inbounds, auth, tunnel,
//!                                              dns, hosts, log }
//!                                               │
//!                                               ▼
//!                                   listener reconcilers ──▶ OS sockets
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use proxy_gateway::api;
use proxy_gateway::config::{load_config, ConfigSnapshot, ConfigWatcher};
use proxy_gateway::executor;
use proxy_gateway::lifecycle::{Shutdown, SignalAction, Signals};
use proxy_gateway::net::{address::socket_target, SocketBinder};
use proxy_gateway::observability::{logging, metrics};
use proxy_gateway::runtime::Runtime;

#[derive(Parser)]
#[command(name = "proxy-gateway", version, about = "Local proxy gateway", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the control API address (external-controller)
    #[arg(long)]
    ext_ctl: Option<String>,

    /// Reload the configuration file when it changes
    #[arg(long)]
    watch: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let snapshot = load_config(&args.config)?;
    let log = logging::init(snapshot.general.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "proxy-gateway starting"
    );

    if let Some(addr) = args.metrics_address {
        metrics::init_metrics(addr);
    }

    let mut signals = Signals::register()?;
    let runtime = Arc::new(Runtime::new(Arc::new(SocketBinder::default()), log));
    let controller = args
        .ext_ctl
        .clone()
        .unwrap_or_else(|| snapshot.controller.external_controller.clone());
    let secret = snapshot.controller.secret.clone();

    reload(&runtime, snapshot).await;

    let shutdown = Shutdown::new();
    let api_task = if controller.is_empty() {
        None
    } else {
        let listener = TcpListener::bind(socket_target(&controller)).await?;
        let app = api::router(Arc::clone(&runtime), &secret);
        Some(tokio::spawn(api::serve(listener, app, shutdown.signalled())))
    };

    let (watcher, mut updates) = ConfigWatcher::new(&args.config);
    let _watcher = if args.watch { Some(watcher.run()?) } else { None };

    loop {
        tokio::select! {
            Some(snapshot) = updates.recv() => reload(&runtime, snapshot).await,
            action = signals.recv() => match action {
                SignalAction::Shutdown => break,
                SignalAction::Reload => reload_file(&runtime, &args.config).await,
            },
        }
    }

    tracing::info!("Shutting down");
    shutdown.trigger();
    if let Some(task) = api_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Control API exited with error"),
            Err(e) => tracing::error!(error = %e, "Control API task panicked"),
            Ok(Ok(())) => {}
        }
    }
    runtime.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Apply a full snapshot, including general settings.
async fn reload(runtime: &Runtime, snapshot: ConfigSnapshot) {
    let _writer = runtime.writer().lock().await;
    let report = executor::apply(runtime, snapshot, true).await;
    if !report.is_clean() {
        tracing::warn!("Configuration applied with failures, see errors above");
    }
}

async fn reload_file(runtime: &Runtime, path: &Path) {
    match load_config(path) {
        Ok(snapshot) => reload(runtime, snapshot).await,
        Err(e) => tracing::error!(error = %e, "Failed to reload config, keeping current configuration"),
    }
}
