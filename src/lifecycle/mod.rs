//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build registry + factories → Serve
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Sessions close (1001) → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One root cancellation token; sessions hold child tokens
//! - Shutdown has a deadline: live sessions get a bounded drain window

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{SessionTracker, Shutdown};
pub use startup::Gateway;
