//! Tunnel error types.

use std::error::Error as StdError;
use std::time::Duration;

use tokio_tungstenite::tungstenite;

use crate::tunnel::relay::Direction;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to derive a backend URL for an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no backend_path configured for backend {0:?}")]
    MissingBackendPath(String),

    #[error("unknown backend {name:?} (available: {})", available.join(", "))]
    UnknownBackend { name: String, available: Vec<String> },

    #[error("no backend configured for endpoint")]
    NoBackend,

    #[error("no host configured in backend")]
    NoHost,

    #[error("invalid backend host {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("malformed backend URL {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },
}

/// Failure to open the backend leg of a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("invalid backend handshake request for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to connect to backend WebSocket {url}: {source}")]
    Dial {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("backend WebSocket {url} handshake timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("session cancelled while connecting to {url}")]
    Cancelled { url: String },
}

/// Terminal condition of one relay direction.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay cancelled")]
    Cancelled,

    #[error("read error ({direction}): {source}")]
    Read {
        direction: Direction,
        #[source]
        source: BoxError,
    },

    #[error("write error ({direction}): {source}")]
    Write {
        direction: Direction,
        #[source]
        source: BoxError,
    },
}

impl RelayError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelayError::Cancelled)
    }

    /// True when the source sent a message over the configured size limit.
    pub fn is_message_too_big(&self) -> bool {
        let RelayError::Read { source, .. } = self else {
            return false;
        };
        let mut current: Option<&(dyn StdError + 'static)> = Some(source.as_ref());
        while let Some(err) = current {
            if let Some(tungstenite::Error::Capacity(_)) = err.downcast_ref::<tungstenite::Error>() {
                return true;
            }
            current = err.source();
        }
        false
    }
}
