//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tunnel_sessions_total` (counter): finished sessions by outcome
//! - `tunnel_sessions_active` (gauge): sessions currently relaying or connecting
//! - `tunnel_session_duration_seconds` (histogram): session lifetime
//! - `tunnel_messages_total` / `tunnel_bytes_total` (counter): relayed traffic by direction
//! - `gateway_http_requests_total` (counter): delegated plain HTTP requests by status
//!
//! # Design Decisions
//! - Recording is always safe; without an installed exporter the calls are no-ops
//! - Labels are bounded (outcome, direction, status)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::tunnel::relay::{Direction, RelayStats};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_started() {
    gauge!("tunnel_sessions_active").increment(1.0);
}

pub fn record_session_finished(outcome: &'static str, started: Instant) {
    gauge!("tunnel_sessions_active").decrement(1.0);
    counter!("tunnel_sessions_total", "outcome" => outcome).increment(1);
    histogram!("tunnel_session_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_relay(direction: Direction, stats: RelayStats) {
    counter!("tunnel_messages_total", "direction" => direction.as_str()).increment(stats.messages);
    counter!("tunnel_bytes_total", "direction" => direction.as_str()).increment(stats.bytes);
}

pub fn record_http_request(status: u16) {
    counter!("gateway_http_requests_total", "status" => status.to_string()).increment(1);
}
