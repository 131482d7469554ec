//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the backend registry and the tunnel-wrapped handler factory
//! - Assemble the HTTP server
//! - On shutdown, wait (bounded) for tunnel sessions to send their close frames
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener is bound by the caller, so tests can use ephemeral ports

use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::http::{ForwardingFactory, GatewayServer};
use crate::lifecycle::shutdown::{SessionTracker, Shutdown};
use crate::tunnel::TunnelHandlerFactory;

/// Upper bound on how long shutdown waits for live sessions.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A fully wired gateway, ready to serve.
pub struct Gateway {
    server: GatewayServer,
    sessions: SessionTracker,
}

impl Gateway {
    pub fn build(config: &GatewayConfig, shutdown: &Shutdown) -> Self {
        let tunnel = TunnelHandlerFactory::from_gateway_config(config, shutdown.token());
        let sessions = tunnel.sessions().clone();
        let factory = tunnel.wrap(ForwardingFactory::new(&config.timeouts));

        tracing::info!(endpoints = config.endpoints.len(), "Gateway assembled");

        Self {
            server: GatewayServer::new(config, &factory, shutdown.clone()),
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Serve until shutdown, then drain tunnel sessions.
    pub async fn serve(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.server.run(listener).await?;

        let live = self.sessions.active_count();
        if live > 0 {
            tracing::info!(sessions = live, "Waiting for tunnel sessions to close");
            let remaining = self.sessions.wait_idle(DRAIN_TIMEOUT).await;
            if remaining > 0 {
                tracing::warn!(sessions = remaining, "Tunnel sessions still open at drain deadline");
            }
        }
        Ok(())
    }
}
