//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and endpoint paths
//! - Detect duplicate endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Tunnel namespaces are lenient by contract and are not validated here

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid listener bind address {0:?}")]
    BindAddress(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("endpoint {0:?} must start with '/' and use {{name}} captures")]
    EndpointPath(String),

    #[error("endpoint {0:?} is declared more than once")]
    DuplicateEndpoint(String),

    #[error("request timeout must be greater than zero")]
    RequestTimeout,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::RequestTimeout);
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        if !is_route_path(&endpoint.endpoint) {
            errors.push(ValidationError::EndpointPath(endpoint.endpoint.clone()));
        }
        if !seen.insert(endpoint.endpoint.as_str()) {
            errors.push(ValidationError::DuplicateEndpoint(endpoint.endpoint.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Route paths are absolute and use `{name}` / `{*rest}` captures; the
/// legacy `:name` and `*rest` segment forms are rejected.
fn is_route_path(path: &str) -> bool {
    path.starts_with('/')
        && !path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
}
