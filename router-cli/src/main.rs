#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Command-line entry point: parses flags, loads the router configuration, wires a
//! [`router_core::Router`] to a concrete [`router_core::interface::NetworkIo`], and
//! keeps the process alive while the timeout driver threads run.
//!
//! Frame capture/injection (the raw-socket or tap-device loop that actually moves
//! bytes on the wire) is the embedder's concern, not this crate's — see
//! [`router_core::interface::NetworkIo`]. This binary ships a logging stand-in so the
//! data plane can be exercised end to end without root or a real NIC.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use router_core::interface::NetworkIo;
use router_core::time::SystemClock;
use router_core::timeout::TimeoutDrivers;
use router_core::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Software IPv4 router with NAT", long_about = None)]
struct Cli {
    /// Path to the router's TOML configuration file.
    #[arg(short, long, env = "ROUTER_CONFIG", default_value = "router.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, env = "ROUTER_LOG_FORMAT", default_value_t = LogFormat::Human)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Human => write!(f, "human"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_format);

    let loaded = config::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    tracing::info!(
        internal_iface = %loaded.router.internal_iface,
        external_iface = %loaded.router.external_iface,
        nat_enabled = loaded.router.nat_enabled,
        "router starting"
    );

    let router = Arc::new(Router::new(
        loaded.router,
        loaded.interfaces,
        loaded.routes,
        SystemClock::new(),
        LoggingIo::default(),
    ));

    let _drivers = TimeoutDrivers::spawn(Arc::clone(&router));

    // No raw-socket or tap-device loop is wired up yet (that's the embedder's job, see
    // module docs), so the process just keeps the timeout driver threads alive until
    // it's killed.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}

fn setup_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Human => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

/// Logs every frame it's asked to send instead of transmitting it — a stand-in for a
/// raw-socket or tap-device backend, which is out of scope for this crate (see module
/// docs).
#[derive(Debug, Default)]
struct LoggingIo;

impl NetworkIo for LoggingIo {
    fn send(&self, frame: &[u8], iface: &str) {
        tracing::debug!(iface, bytes = frame.len(), "would transmit frame");
    }
}
