//! One-directional message relay.
//!
//! # Data Flow
//! ```text
//! source (Stream) ──next()──▶ Frame ──send()──▶ destination (Sink)
//!        ▲                                            ▲
//!        └──────────── CancellationToken ─────────────┘
//! ```
//!
//! # Design Decisions
//! - Messages pass through opaquely: same kind, same bytes, same order
//! - Every await point races the session's cancellation token
//! - Close frames are forwarded and end the relay
//! - Ping and pong are relayed too; each library also answers pings itself, so a
//!   peer can see two pongs for one ping

use std::fmt;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use axum::extract::ws as axum_ws;

use crate::tunnel::error::{BoxError, RelayError};

/// Relay direction, used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client->backend",
            Direction::BackendToClient => "backend->client",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Close code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const INTERNAL_ERROR: u16 = 1011;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A WebSocket message independent of the library that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

impl Frame {
    /// Payload length in bytes. Close frames count their reason.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) | Frame::Ping(data) | Frame::Pong(data) => data.len(),
            Frame::Close(reason) => reason.as_ref().map_or(0, |r| r.reason.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close(_) => "close",
        }
    }
}

/// Conversion between a WebSocket library's message type and [`Frame`].
pub trait WireMessage: Sized {
    /// `None` for messages that carry nothing to relay (raw frames).
    fn into_frame(self) -> Option<Frame>;
    fn from_frame(frame: Frame) -> Self;
}

impl WireMessage for Frame {
    fn into_frame(self) -> Option<Frame> {
        Some(self)
    }

    fn from_frame(frame: Frame) -> Self {
        frame
    }
}

impl WireMessage for axum_ws::Message {
    fn into_frame(self) -> Option<Frame> {
        Some(match self {
            axum_ws::Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            axum_ws::Message::Binary(data) => Frame::Binary(data),
            axum_ws::Message::Ping(data) => Frame::Ping(data),
            axum_ws::Message::Pong(data) => Frame::Pong(data),
            axum_ws::Message::Close(close) => Frame::Close(
                close.map(|c| CloseReason::new(c.code, c.reason.as_str())),
            ),
        })
    }

    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => axum_ws::Message::Text(text.into()),
            Frame::Binary(data) => axum_ws::Message::Binary(data),
            Frame::Ping(data) => axum_ws::Message::Ping(data),
            Frame::Pong(data) => axum_ws::Message::Pong(data),
            Frame::Close(close) => axum_ws::Message::Close(close.map(|c| axum_ws::CloseFrame {
                code: c.code,
                reason: c.reason.into(),
            })),
        }
    }
}

impl WireMessage for tungstenite::Message {
    fn into_frame(self) -> Option<Frame> {
        Some(match self {
            tungstenite::Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            tungstenite::Message::Binary(data) => Frame::Binary(data),
            tungstenite::Message::Ping(data) => Frame::Ping(data),
            tungstenite::Message::Pong(data) => Frame::Pong(data),
            tungstenite::Message::Close(close) => Frame::Close(
                close.map(|c| CloseReason::new(c.code.into(), c.reason.as_str())),
            ),
            tungstenite::Message::Frame(_) => return None,
        })
    }

    fn from_frame(frame: Frame) -> Self {
        use tungstenite::protocol::CloseFrame;

        match frame {
            Frame::Text(text) => tungstenite::Message::Text(text.into()),
            Frame::Binary(data) => tungstenite::Message::Binary(data),
            Frame::Ping(data) => tungstenite::Message::Ping(data),
            Frame::Pong(data) => tungstenite::Message::Pong(data),
            Frame::Close(close) => tungstenite::Message::Close(close.map(|c| CloseFrame {
                code: c.code.into(),
                reason: c.reason.into(),
            })),
        }
    }
}

/// How a relay direction finished without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The source stream ended without a close frame.
    SourceEnded,
    /// A close frame was read and forwarded to the destination.
    CloseForwarded,
}

/// Counters for one relay direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub messages: u64,
    pub bytes: u64,
}

/// Copy messages from `source` to `destination` until the source closes,
/// an error occurs, or `cancel` fires.
pub async fn relay<S, D, In, Out, RE>(
    cancel: &CancellationToken,
    direction: Direction,
    source: &mut S,
    destination: &mut D,
    stats: &mut RelayStats,
) -> Result<RelayEnd, RelayError>
where
    S: Stream<Item = Result<In, RE>> + Unpin,
    D: Sink<Out> + Unpin,
    D::Error: Into<BoxError>,
    RE: Into<BoxError>,
    In: WireMessage,
    Out: WireMessage,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            next = source.next() => next,
        };

        let message = match next {
            None => return Ok(RelayEnd::SourceEnded),
            Some(Err(e)) => {
                let source: BoxError = e.into();
                tracing::debug!(direction = %direction, error = %source, "WebSocket read error");
                return Err(RelayError::Read { direction, source });
            }
            Some(Ok(message)) => message,
        };

        let Some(frame) = message.into_frame() else {
            continue;
        };
        let is_close = frame.is_close();
        let len = frame.len();

        tracing::trace!(
            direction = %direction,
            kind = frame.kind(),
            bytes = len,
            "Relaying message"
        );

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            sent = destination.send(Out::from_frame(frame)) => sent,
        };
        if let Err(e) = sent {
            let source: BoxError = e.into();
            tracing::debug!(direction = %direction, error = %source, "WebSocket write error");
            return Err(RelayError::Write { direction, source });
        }

        stats.messages += 1;
        stats.bytes += len as u64;

        if is_close {
            return Ok(RelayEnd::CloseForwarded);
        }
    }
}
