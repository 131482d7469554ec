//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with one route per configured endpoint
//! - Obtain each endpoint's handler from the (wrapped) handler factory
//! - Wire up middleware (tracing, request ID, request timeout)
//! - Serve with graceful shutdown

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::any,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::lifecycle::Shutdown;
use crate::tunnel::handler::HandlerFactory;

/// HTTP server hosting the configured endpoints.
pub struct GatewayServer {
    router: Router,
    shutdown: Shutdown,
}

impl GatewayServer {
    /// Build the server; every endpoint's handler comes from `factory`.
    pub fn new<F: HandlerFactory>(config: &GatewayConfig, factory: &F, shutdown: Shutdown) -> Self {
        let router = Self::build_router(config, factory);
        Self { router, shutdown }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router<F: HandlerFactory>(config: &GatewayConfig, factory: &F) -> Router {
        let mut router = Router::new();

        for endpoint in &config.endpoints {
            let handler = factory.build(endpoint);
            tracing::debug!(endpoint = %endpoint.endpoint, method = %endpoint.method, "Route registered");
            router = router.route(
                &endpoint.endpoint,
                any(move |request: Request<Body>| async move { handler.call(request).await }),
            );
        }

        router
            .fallback(not_found)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.triggered().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The assembled router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "No matching endpoint" })))
}
