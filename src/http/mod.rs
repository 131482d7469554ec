//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → endpoint route → handler from the wrapped factory
//!         → tunnel (upgrade requests on tunnel endpoints)
//!         → forward.rs (everything else, proxied upstream)
//!     → Send to client
//! ```

pub mod forward;
pub mod server;

pub use forward::ForwardingFactory;
pub use server::GatewayServer;
