//! Handler factory decorator.
//!
//! # Responsibilities
//! - Wrap the host gateway's per-endpoint handler factory
//! - Leave endpoints without a `websocket` namespace untouched
//! - On tunnel endpoints, route upgrade requests into a [`TunnelSession`]
//!   and everything else to the wrapped handler
//!
//! # Data Flow
//! ```text
//! Request → is_upgrade? ──no──▶ inner handler
//!                │
//!               yes → AuthHeaders::extract → backend configured? ──no──▶ 500
//!                │
//!                └─▶ WebSocketUpgrade ──rejected──▶ rejection response
//!                          │
//!                          └─▶ on_upgrade → TunnelSession::run
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, FromRequestParts},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::{EndpointConfig, GatewayConfig};
use crate::lifecycle::shutdown::SessionTracker;
use crate::tunnel::address::BackendResolver;
use crate::tunnel::auth::AuthHeaders;
use crate::tunnel::registry::BackendRegistry;
use crate::tunnel::session::TunnelSession;
use crate::tunnel::settings::TunnelConfig;
use crate::tunnel::upgrade::is_upgrade;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, cloneable request handler for one endpoint.
#[derive(Clone)]
pub struct EndpointHandler {
    inner: Arc<dyn Fn(Request<Body>) -> HandlerFuture + Send + Sync>,
}

impl EndpointHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |request| Box::pin(f(request))),
        }
    }

    pub fn call(&self, request: Request<Body>) -> HandlerFuture {
        (self.inner)(request)
    }

    /// True when both handles share the same underlying handler.
    pub fn ptr_eq(&self, other: &EndpointHandler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for EndpointHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointHandler").finish_non_exhaustive()
    }
}

/// Builds the handler serving one endpoint.
pub trait HandlerFactory: Send + Sync + 'static {
    fn build(&self, endpoint: &EndpointConfig) -> EndpointHandler;
}

impl<F> HandlerFactory for F
where
    F: Fn(&EndpointConfig) -> EndpointHandler + Send + Sync + 'static,
{
    fn build(&self, endpoint: &EndpointConfig) -> EndpointHandler {
        self(endpoint)
    }
}

/// Decorates a [`HandlerFactory`] with WebSocket tunnelling.
#[derive(Debug, Clone)]
pub struct TunnelHandlerFactory {
    resolver: BackendResolver,
    shutdown: CancellationToken,
    sessions: SessionTracker,
}

impl TunnelHandlerFactory {
    /// Sessions are cancelled when `shutdown` is.
    pub fn new(registry: Arc<BackendRegistry>, shutdown: CancellationToken) -> Self {
        Self {
            resolver: BackendResolver::new(registry),
            shutdown,
            sessions: SessionTracker::new(),
        }
    }

    /// Build the registry from the gateway-level `websocket_backends` namespace.
    pub fn from_gateway_config(config: &GatewayConfig, shutdown: CancellationToken) -> Self {
        let registry = BackendRegistry::from_extra_config(&config.extra_config);
        tracing::info!(
            backends = registry.len(),
            strict = registry.is_strict(),
            "WebSocket backend registry loaded"
        );
        Self::new(Arc::new(registry), shutdown)
    }

    pub fn registry(&self) -> &BackendRegistry {
        self.resolver.registry()
    }

    /// Live sessions started by handlers of this factory.
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn wrap<F: HandlerFactory>(self, inner: F) -> TunnelWrapped<F> {
        TunnelWrapped {
            inner,
            tunnel: self,
        }
    }
}

/// Factory produced by [`TunnelHandlerFactory::wrap`].
pub struct TunnelWrapped<F> {
    inner: F,
    tunnel: TunnelHandlerFactory,
}

impl<F: HandlerFactory> HandlerFactory for TunnelWrapped<F> {
    fn build(&self, endpoint: &EndpointConfig) -> EndpointHandler {
        let next = self.inner.build(endpoint);

        let Some(resolution) = TunnelConfig::resolve(&endpoint.extra_config) else {
            return next;
        };
        let config = resolution.config;

        tracing::info!(
            endpoint = %endpoint.endpoint,
            subprotocols = ?config.subprotocols,
            handshake_timeout = ?config.handshake_timeout,
            max_message_size = ?config.max_message_size,
            defaulted = ?resolution.defaulted,
            "WebSocket tunnel enabled"
        );
        if config.compression {
            tracing::warn!(
                endpoint = %endpoint.endpoint,
                "Compression requested but not negotiated; messages are relayed uncompressed"
            );
        }

        let route = Arc::new(TunnelRoute {
            endpoint: Arc::new(endpoint.clone()),
            config: Arc::new(config),
            resolver: self.tunnel.resolver.clone(),
            shutdown: self.tunnel.shutdown.clone(),
            sessions: self.tunnel.sessions.clone(),
            next,
        });

        EndpointHandler::new(move |request| {
            let route = Arc::clone(&route);
            async move { route.handle(request).await }
        })
    }
}

struct TunnelRoute {
    endpoint: Arc<EndpointConfig>,
    config: Arc<TunnelConfig>,
    resolver: BackendResolver,
    shutdown: CancellationToken,
    sessions: SessionTracker,
    next: EndpointHandler,
}

impl TunnelRoute {
    async fn handle(&self, request: Request<Body>) -> Response {
        if !is_upgrade(request.headers()) {
            return self.next.call(request).await;
        }

        let auth = AuthHeaders::extract(request.headers());

        if !has_backend(&self.endpoint) {
            tracing::error!(
                endpoint = %self.endpoint.endpoint,
                "No backend configured for WebSocket endpoint"
            );
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "No backend configured" })),
            )
                .into_response();
        }

        let (mut parts, _body) = request.into_parts();
        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => {
                tracing::warn!(
                    endpoint = %self.endpoint.endpoint,
                    error = %rejection,
                    "WebSocket upgrade rejected"
                );
                return rejection.into_response();
            }
        };

        let limit = self.config.max_message_size.unwrap_or(usize::MAX);
        let upgrade = upgrade
            .protocols(self.config.subprotocols.clone())
            .read_buffer_size(self.config.read_buffer_size)
            .write_buffer_size(self.config.write_buffer_size)
            .max_message_size(limit)
            .max_frame_size(limit);

        let session = TunnelSession::new(
            Arc::clone(&self.endpoint),
            Arc::clone(&self.config),
            self.resolver.clone(),
            auth,
            &self.shutdown,
        );
        let endpoint = self.endpoint.endpoint.clone();
        let sessions = self.sessions.clone();

        tracing::debug!(
            session = %session.id(),
            endpoint = %endpoint,
            "Upgrading client connection"
        );

        upgrade
            .on_failed_upgrade(move |error: axum::Error| {
                tracing::warn!(endpoint = %endpoint, error = %error, "Client WebSocket upgrade failed");
            })
            .on_upgrade(move |socket| async move {
                let _live = sessions.track();
                session.run(socket).await;
            })
    }
}

/// Whether the endpoint describes a backend in either supported shape.
fn has_backend(endpoint: &EndpointConfig) -> bool {
    endpoint
        .extra_config
        .get("backend")
        .is_some_and(Value::is_string)
        || !endpoint.backend.is_empty()
}
