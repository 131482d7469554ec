//! Per-endpoint tunnel configuration.
//!
//! # Responsibilities
//! - Read the `websocket` namespace from an endpoint's `extra_config`
//! - Apply defaults, then override field by field
//! - Report which fields stayed at their default
//!
//! # Design Decisions
//! - Lenient: a wrong-shaped field keeps its default, it never fails resolution
//! - Only a non-object namespace value disqualifies the endpoint
//! - Durations use the Go-style unit syntax common in gateway configs ("30s", "1m30s")

use std::time::Duration;

use serde_json::Value;

use crate::config::ExtraConfig;

/// Namespace key inside an endpoint's `extra_config`.
pub const CONFIG_NAMESPACE: &str = "websocket";

pub const DEFAULT_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Resolved tunnel settings for one endpoint. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Upper bound for the backend handshake.
    pub handshake_timeout: Duration,
    pub compression: bool,
    /// Subprotocols offered to clients, in preference order.
    pub subprotocols: Vec<String>,
    /// Forced backend scheme (`ws` / `wss`); `None` means derive it.
    pub backend_scheme: Option<String>,
    /// Read limit applied to both legs; `None` means unlimited.
    pub max_message_size: Option<usize>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            compression: false,
            subprotocols: Vec::new(),
            backend_scheme: None,
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
        }
    }
}

/// Outcome of resolving an endpoint's tunnel namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub config: TunnelConfig,
    /// Keys that were absent or unusable and kept their default.
    pub defaulted: Vec<&'static str>,
}

impl Resolution {
    pub fn is_defaulted(&self, key: &str) -> bool {
        self.defaulted.contains(&key)
    }
}

impl TunnelConfig {
    /// Resolve the tunnel namespace of an endpoint.
    ///
    /// Returns `None` when the namespace is absent or is not a table; such
    /// endpoints are not tunnel endpoints.
    pub fn resolve(extra: &ExtraConfig) -> Option<Resolution> {
        let table = extra.get(CONFIG_NAMESPACE)?.as_object()?;

        let mut config = TunnelConfig::default();
        let mut defaulted = Vec::new();
        let mut apply = |key: &'static str, applied: bool| {
            if !applied {
                defaulted.push(key);
            }
        };

        apply(
            "read_buffer_size",
            table
                .get("read_buffer_size")
                .and_then(positive_size)
                .map(|n| config.read_buffer_size = n)
                .is_some(),
        );

        apply(
            "write_buffer_size",
            table
                .get("write_buffer_size")
                .and_then(positive_size)
                .map(|n| config.write_buffer_size = n)
                .is_some(),
        );

        apply(
            "handshake_timeout",
            table
                .get("handshake_timeout")
                .and_then(Value::as_str)
                .and_then(parse_duration)
                .map(|d| config.handshake_timeout = d)
                .is_some(),
        );

        apply(
            "compression",
            table
                .get("compression")
                .and_then(Value::as_bool)
                .map(|b| config.compression = b)
                .is_some(),
        );

        apply(
            "subprotocols",
            table
                .get("subprotocols")
                .and_then(Value::as_array)
                .map(|items| {
                    config.subprotocols = items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect();
                })
                .is_some(),
        );

        apply(
            "backend_scheme",
            table
                .get("backend_scheme")
                .and_then(Value::as_str)
                .map(|s| {
                    config.backend_scheme = Some(s.to_owned()).filter(|s| !s.is_empty());
                })
                .is_some(),
        );

        apply(
            "max_message_size",
            table
                .get("max_message_size")
                .and_then(as_integer)
                .map(|n| {
                    config.max_message_size = usize::try_from(n).ok().filter(|n| *n > 0);
                })
                .is_some(),
        );

        Some(Resolution { config, defaulted })
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

fn positive_size(value: &Value) -> Option<usize> {
    as_integer(value)
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
}

/// Parse a duration such as `"300ms"`, `"30s"`, `"1m30s"` or `"1.5h"`.
///
/// A bare `"0"` is accepted. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    if input == "0" {
        return Some(Duration::ZERO);
    }
    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest.is_empty() {
        return None;
    }

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        if number.is_empty() || number == "." {
            return None;
        }
        let value: f64 = number.parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];

        total_nanos += value * unit_nanos;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}
