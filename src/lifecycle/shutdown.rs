//! Shutdown coordination for the gateway.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Wraps a root cancellation token; the HTTP server and every tunnel session
/// derive from it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root token. Clones observe the same cancellation.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }
}

/// Counts live tunnel sessions so shutdown can wait for them to close.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a live session. The count drops when the guard does.
    pub fn track(&self) -> SessionGuard {
        self.active.send_modify(|n| *n += 1);
        SessionGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active_count(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until no session is live, or `deadline` elapses.
    /// Returns the number of sessions still live.
    pub async fn wait_idle(&self, deadline: Duration) -> usize {
        let mut rx = self.active.subscribe();
        let _ = tokio::time::timeout(deadline, rx.wait_for(|n| *n == 0)).await;
        self.active_count()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard tracking one session's lifetime.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}
