//! cmdrelay server binary.
//!
//! Loads configuration from `RELAY_*` environment variables and runs the
//! relay until SIGINT or SIGTERM.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use cmdrelay_server::{RelayConfig, RelayServer};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config)?;

    info!("Starting {} v{}", NAME, VERSION);
    info!(
        socket_addr = %config.socket_addr(),
        websocket_addr = %config.websocket_addr(),
        path = %config.websocket_path,
        flush_interval_ms = config.flush_interval_ms,
        idle_timeout_secs = config.idle_timeout_secs,
        "configuration loaded"
    );

    let server = RelayServer::new(config).context("failed to create relay server")?;
    let shutdown = CancellationToken::new();
    let running = server
        .start(shutdown.clone())
        .await
        .context("failed to start relay server")?;

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, initiating graceful shutdown...");
        shutdown.cancel();
    });

    running.wait().await;

    let metrics = server.metrics();
    info!(
        connections = metrics.connections_opened(),
        received = metrics.messages_received(),
        parse_errors = metrics.parse_errors(),
        coalesced = metrics.messages_coalesced(),
        deliveries = metrics.deliveries(),
        uptime_secs = metrics.uptime().as_secs(),
        "relay stopped"
    );
    Ok(())
}

/// Installs the global subscriber: `RUST_LOG` wins over the configured
/// level; output goes to the log file when one is set.
fn init_tracing(config: &RelayConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log filter")?;

    let (file_layer, stdout_layer) = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path}"))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (None, Some(fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
