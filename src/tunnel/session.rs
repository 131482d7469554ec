//! Session lifecycle: backend dial, supervised relay, deterministic teardown.
//!
//! # State Machine
//! ```text
//! ClientUpgraded ──▶ BackendConnecting ──┬──▶ Relaying ──▶ Closed
//!                                        └──▶ BackendConnectFailed (client closed 1011)
//! ```
//!
//! # Design Decisions
//! - One child `CancellationToken` per session, shared by both relay tasks
//! - The supervisor awaits the first relay, cancels, then joins the other
//! - Each connection half is owned by exactly one task; sinks are handed back
//!   to the supervisor so it can send the final close frames
//! - Both final close frames are sent concurrently, each bounded by
//!   [`CLOSE_TIMEOUT`]; a stalled peer never delays the other leg's close
//! - A leg that read an oversized message is closed with 1009

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocket;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::EndpointConfig;
use crate::observability::metrics;
use crate::tunnel::address::{BackendResolver, ResolvedBackend};
use crate::tunnel::auth::AuthHeaders;
use crate::tunnel::error::{BoxError, ConnectError, RelayError};
use crate::tunnel::relay::{relay, CloseReason, Direction, Frame, RelayEnd, RelayStats, WireMessage};
use crate::tunnel::settings::TunnelConfig;

/// Upper bound on delivering one final close frame.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Backend leg of a session.
pub type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Per-process session identifier, for log correlation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A peer closed or a stream ended.
    Completed,
    /// A relay direction failed with a read or write error.
    RelayFailed,
    /// The backend could not be resolved or dialed.
    BackendConnectFailed,
    /// The gateway is shutting down.
    Shutdown,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::RelayFailed => "relay_failed",
            SessionOutcome::BackendConnectFailed => "backend_connect_failed",
            SessionOutcome::Shutdown => "shutdown",
        }
    }
}

/// One client connection paired with one backend connection.
pub struct TunnelSession {
    id: SessionId,
    endpoint: Arc<EndpointConfig>,
    config: Arc<TunnelConfig>,
    resolver: BackendResolver,
    auth: AuthHeaders,
    shutdown: CancellationToken,
    cancel: CancellationToken,
}

impl TunnelSession {
    /// `shutdown` is the gateway token; the session cancels a child of it.
    pub fn new(
        endpoint: Arc<EndpointConfig>,
        config: Arc<TunnelConfig>,
        resolver: BackendResolver,
        auth: AuthHeaders,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            id: SessionId::next(),
            endpoint,
            config,
            resolver,
            auth,
            shutdown: shutdown.clone(),
            cancel: shutdown.child_token(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Token shared by both relay directions of this session.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolve the backend and open the outbound WebSocket, carrying the
    /// captured auth headers. Bounded by the handshake timeout.
    pub async fn connect_backend(&self) -> Result<(BackendStream, ResolvedBackend), ConnectError> {
        let resolved = self
            .resolver
            .resolve(&self.endpoint, self.config.backend_scheme.as_deref())?;
        let url = resolved.url.to_string();

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::Request {
                url: url.clone(),
                source: BoxError::from(e),
            })?;
        self.auth.apply_to(request.headers_mut());

        let ws_config = backend_ws_config(&self.config);

        tracing::debug!(
            session = %self.id,
            endpoint = %self.endpoint.endpoint,
            url = %url,
            auth_headers = self.auth.len(),
            "Connecting to backend WebSocket"
        );

        let after = self.config.handshake_timeout;
        let dial = tokio::time::timeout(
            after,
            tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false),
        );

        let dialed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ConnectError::Cancelled { url }),
            dialed = dial => dialed,
        };

        match dialed {
            Err(_) => Err(ConnectError::Timeout { url, after }),
            Ok(Err(source)) => Err(ConnectError::Dial { url, source }),
            Ok(Ok((stream, response))) => {
                tracing::debug!(
                    session = %self.id,
                    url = %url,
                    status = %response.status(),
                    "Backend handshake complete"
                );
                Ok((stream, resolved))
            }
        }
    }

    /// Drive the session to completion on an upgraded client socket.
    pub async fn run(self, client: WebSocket) -> SessionOutcome {
        let started = Instant::now();
        metrics::record_session_started();

        let outcome = self.drive(client).await;

        tracing::info!(
            session = %self.id,
            endpoint = %self.endpoint.endpoint,
            outcome = outcome.as_str(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Tunnel session closed"
        );
        metrics::record_session_finished(outcome.as_str(), started);
        outcome
    }

    async fn drive(&self, mut client: WebSocket) -> SessionOutcome {
        let (backend, resolved) = match self.connect_backend().await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::error!(
                    session = %self.id,
                    endpoint = %self.endpoint.endpoint,
                    error = %e,
                    "Failed to connect to backend WebSocket"
                );
                let close = CloseReason::new(CloseReason::INTERNAL_ERROR, "Backend connection failed");
                send_close(&mut client, close, self.id, Direction::BackendToClient).await;
                return SessionOutcome::BackendConnectFailed;
            }
        };

        tracing::info!(
            session = %self.id,
            endpoint = %self.endpoint.endpoint,
            url = %resolved.url,
            provenance = %resolved.provenance,
            "Tunnel established"
        );

        let (client_sink, client_stream) = client.split();
        let (backend_sink, backend_stream) = backend.split();

        let mut upstream = tokio::spawn(pump(
            self.cancel.clone(),
            Direction::ClientToBackend,
            client_stream,
            backend_sink,
        ));
        let mut downstream = tokio::spawn(pump(
            self.cancel.clone(),
            Direction::BackendToClient,
            backend_stream,
            client_sink,
        ));

        let (up, down) = tokio::select! {
            up = &mut upstream => {
                self.cancel.cancel();
                (up, downstream.await)
            }
            down = &mut downstream => {
                self.cancel.cancel();
                (upstream.await, down)
            }
        };

        let close = if self.shutdown.is_cancelled() {
            CloseReason::new(CloseReason::GOING_AWAY, "Going away")
        } else {
            CloseReason::new(CloseReason::NORMAL, "Connection closed")
        };

        let too_big = CloseReason::new(CloseReason::MESSAGE_TOO_BIG, "Message too big");
        let backend_close = if read_over_limit(&down) { too_big.clone() } else { close.clone() };
        let client_close = if read_over_limit(&up) { too_big } else { close };

        let (up_failed, down_failed) = tokio::join!(
            self.finish_leg(up, &backend_close),
            self.finish_leg(down, &client_close),
        );

        if self.shutdown.is_cancelled() {
            SessionOutcome::Shutdown
        } else if up_failed || down_failed {
            SessionOutcome::RelayFailed
        } else {
            SessionOutcome::Completed
        }
    }

    /// Log a finished relay direction and close its destination when it has
    /// not already received a close frame. Returns true when the direction
    /// failed.
    async fn finish_leg<D, Out>(&self, joined: Result<Leg<D>, JoinError>, close: &CloseReason) -> bool
    where
        D: Sink<Out> + Unpin,
        D::Error: Into<BoxError>,
        Out: WireMessage,
    {
        let mut leg = match joined {
            Ok(leg) => leg,
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "Relay task aborted");
                return true;
            }
        };

        metrics::record_relay(leg.direction, leg.stats);

        let failed = match &leg.result {
            Ok(end) => {
                tracing::debug!(
                    session = %self.id,
                    direction = %leg.direction,
                    end = ?end,
                    messages = leg.stats.messages,
                    bytes = leg.stats.bytes,
                    "Relay finished"
                );
                false
            }
            Err(RelayError::Cancelled) => {
                tracing::debug!(
                    session = %self.id,
                    direction = %leg.direction,
                    messages = leg.stats.messages,
                    bytes = leg.stats.bytes,
                    "Relay cancelled"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    session = %self.id,
                    endpoint = %self.endpoint.endpoint,
                    direction = %leg.direction,
                    error = %e,
                    "WebSocket relay error"
                );
                true
            }
        };

        if !matches!(leg.result, Ok(RelayEnd::CloseForwarded)) {
            send_close(&mut leg.sink, close.clone(), self.id, leg.direction).await;
        }

        failed
    }
}

/// A finished relay direction, handing its destination sink back.
struct Leg<D> {
    direction: Direction,
    result: Result<RelayEnd, RelayError>,
    stats: RelayStats,
    sink: D,
}

/// Limits and buffer sizes for the backend leg, matching the client leg.
fn backend_ws_config(config: &TunnelConfig) -> WebSocketConfig {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = config.max_message_size;
    ws_config.max_frame_size = config.max_message_size;
    ws_config.read_buffer_size = config.read_buffer_size;
    ws_config.write_buffer_size = config.write_buffer_size;
    ws_config
}

/// True when the direction stopped because its source exceeded the size limit.
fn read_over_limit<D>(joined: &Result<Leg<D>, JoinError>) -> bool {
    matches!(joined, Ok(leg) if leg.result.as_ref().is_err_and(|e| e.is_message_too_big()))
}

async fn pump<S, D, In, Out, RE>(
    cancel: CancellationToken,
    direction: Direction,
    mut source: S,
    mut sink: D,
) -> Leg<D>
where
    S: Stream<Item = Result<In, RE>> + Unpin,
    D: Sink<Out> + Unpin,
    D::Error: Into<BoxError>,
    RE: Into<BoxError>,
    In: WireMessage,
    Out: WireMessage,
{
    let mut stats = RelayStats::default();
    let result = relay(&cancel, direction, &mut source, &mut sink, &mut stats).await;
    Leg {
        direction,
        result,
        stats,
        sink,
    }
}

/// Best-effort close frame; the peer may already be gone.
async fn send_close<D, Out>(sink: &mut D, close: CloseReason, session: SessionId, direction: Direction)
where
    D: Sink<Out> + Unpin,
    D::Error: Into<BoxError>,
    Out: WireMessage,
{
    let code = close.code;
    let frame = Out::from_frame(Frame::Close(Some(close)));
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.send(frame)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let e: BoxError = e.into();
            tracing::debug!(
                session = %session,
                direction = %direction,
                code,
                error = %e,
                "Close frame not delivered"
            );
        }
        Err(_) => {
            tracing::debug!(
                session = %session,
                direction = %direction,
                code,
                timeout_ms = CLOSE_TIMEOUT.as_millis() as u64,
                "Close frame timed out"
            );
        }
    }
}
