//! WebSocket tunnel gateway library.
//!
//! Upgrades inbound HTTP connections on configured endpoints to WebSocket,
//! dials the matching backend with the caller's identity headers, and relays
//! messages both ways. Plain HTTP on the same endpoints is forwarded upstream.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod tunnel;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::{Gateway, Shutdown};
pub use tunnel::TunnelHandlerFactory;
