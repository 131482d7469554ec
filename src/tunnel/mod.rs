//! WebSocket tunnel subsystem.
//!
//! # Data Flow
//! ```text
//! handler.rs (TunnelHandlerFactory wraps the host factory)
//!     → upgrade.rs (is this a WebSocket upgrade?)
//!     → settings.rs (endpoint `websocket` namespace → TunnelConfig)
//!     → auth.rs (caller identity headers)
//!     → session.rs (client upgrade, backend dial, supervision)
//!         → address.rs + registry.rs (backend URL)
//!         → relay.rs ×2 (client→backend, backend→client)
//! ```
//!
//! # Design Decisions
//! - Non-upgrade traffic is never touched; it goes to the wrapped handler
//! - The backend registry is built once and shared read-only
//! - A failed backend ends the session; nothing is retried

pub mod address;
pub mod auth;
pub mod error;
pub mod handler;
pub mod registry;
pub mod relay;
pub mod session;
pub mod settings;
pub mod upgrade;

pub use address::{BackendResolver, Provenance, ResolvedBackend};
pub use auth::AuthHeaders;
pub use error::{ConnectError, RelayError, ResolveError};
pub use handler::{EndpointHandler, HandlerFactory, TunnelHandlerFactory, TunnelWrapped};
pub use registry::BackendRegistry;
pub use relay::{relay, Direction, Frame, RelayEnd};
pub use session::{SessionId, SessionOutcome, TunnelSession};
pub use settings::TunnelConfig;
pub use upgrade::is_upgrade;
