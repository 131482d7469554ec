//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//!
//! Endpoint- and gateway-level `extra_config` blobs stay loosely typed: each
//! subsystem that owns a namespace inside them parses its own keys.

use serde::{Deserialize, Serialize};

/// Loosely-typed namespace map attached to the gateway and to each endpoint.
pub type ExtraConfig = serde_json::Map<String, serde_json::Value>;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration for plain HTTP traffic.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Gateway-level namespaces (e.g. `websocket_backends`).
    pub extra_config: ExtraConfig,

    /// Endpoint definitions.
    pub endpoints: Vec<EndpointConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A single gateway endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Route path served by the gateway (e.g., "/chat").
    pub endpoint: String,

    /// HTTP method for plain requests. Upgrade requests are always GET.
    #[serde(default = "default_method")]
    pub method: String,

    /// Legacy backend description.
    #[serde(default)]
    pub backend: Vec<BackendConfig>,

    /// Endpoint-level namespaces (`websocket`, `backend`, `backend_path`).
    #[serde(default)]
    pub extra_config: ExtraConfig,
}

impl EndpointConfig {
    /// Create an endpoint with no backends and an empty extra config.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: default_method(),
            backend: Vec::new(),
            extra_config: ExtraConfig::new(),
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

/// Upstream description for an endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BackendConfig {
    /// Path appended to the host when forwarding.
    #[serde(default)]
    pub url_pattern: String,

    /// Candidate hosts as HTTP URLs (e.g., "http://127.0.0.1:3000").
    #[serde(default)]
    pub host: Vec<String>,
}

/// Timeout configuration for plain HTTP forwarding.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
