//! WebSocket tunnel gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 TUNNEL GATEWAY                │
//!   Client                │  ┌────────┐   ┌──────────────┐                │
//!   ──────────────────────┼─▶│  http  │──▶│   tunnel     │── upgrade ──┐  │
//!                         │  │ server │   │  handler     │             │  │
//!                         │  └────────┘   └──────┬───────┘             ▼  │
//!                         │                      │ plain         ┌─────────┐│
//!                         │                      ▼               │ session ││
//!                         │               ┌──────────────┐       │ relay×2 ││── Backend (ws/wss)
//!                         │               │ http forward │       └─────────┘│
//!                         │               └──────┬───────┘                  │
//!                         └──────────────────────┼──────────────────────────┘
//!                                                └──────────────────────────── Backend (http)
//! ```

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use tunnel_gateway::config::{load_config, GatewayConfig};
use tunnel_gateway::lifecycle::{signals, Gateway, Shutdown};
use tunnel_gateway::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "tunnel-gateway", version, about = "WebSocket tunnel gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);

    // wss:// backends need a process-wide crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing::info!("tunnel-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        endpoints = config.endpoints.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let gateway = Gateway::build(&config, &shutdown);
    gateway.serve(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
