//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (subscriber setup, structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout / log aggregation
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (endpoint, session, direction, url) on every event
//! - Request ID flows in through the `x-request-id` header
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
