//! Backend address derivation.
//!
//! # Responsibilities
//! - Named shape: `extra_config.backend` + `extra_config.backend_path`
//!   resolved through the [`BackendRegistry`]
//! - Legacy shape: first host of the endpoint's backend list, HTTP scheme
//!   mapped to its WebSocket equivalent
//! - Apply a forced scheme last, unconditionally
//!
//! # Design Decisions
//! - The registry is injected, never global
//! - Every result carries a [`Provenance`] so best-effort fallbacks are visible

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::config::{BackendConfig, EndpointConfig};
use crate::tunnel::error::ResolveError;
use crate::tunnel::registry::{BackendRegistry, Lookup};

/// Which rule produced a backend address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Registry,
    StaticTable,
    DefaultHost,
    HostList,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Registry => "registry",
            Provenance::StaticTable => "static_table",
            Provenance::DefaultHost => "default_host",
            Provenance::HostList => "host_list",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived backend WebSocket address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    pub url: Url,
    pub provenance: Provenance,
}

/// Resolves endpoint backend descriptions to WebSocket URLs.
#[derive(Debug, Clone)]
pub struct BackendResolver {
    registry: Arc<BackendRegistry>,
}

impl BackendResolver {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Derive the backend URL for an endpoint.
    ///
    /// `forced_scheme`, when non-empty, replaces whatever scheme the shape
    /// produced.
    pub fn resolve(
        &self,
        endpoint: &EndpointConfig,
        forced_scheme: Option<&str>,
    ) -> Result<ResolvedBackend, ResolveError> {
        let named = endpoint
            .extra_config
            .get("backend")
            .and_then(Value::as_str);

        let (candidate, provenance) = match named {
            Some(name) => {
                let path = endpoint
                    .extra_config
                    .get("backend_path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ResolveError::MissingBackendPath(name.to_owned()))?;
                self.named(&endpoint.endpoint, name, path)?
            }
            None => from_host_list(&endpoint.backend)?,
        };

        let mut url = Url::parse(&candidate).map_err(|e| ResolveError::MalformedUrl {
            url: candidate.clone(),
            reason: e.to_string(),
        })?;

        if let Some(scheme) = forced_scheme.filter(|s| !s.is_empty()) {
            url.set_scheme(scheme)
                .map_err(|()| ResolveError::MalformedUrl {
                    url: candidate.clone(),
                    reason: format!("cannot switch scheme to {scheme:?}"),
                })?;
        }

        tracing::debug!(
            endpoint = %endpoint.endpoint,
            url = %url,
            provenance = %provenance,
            "Derived backend WebSocket URL"
        );

        Ok(ResolvedBackend { url, provenance })
    }

    fn named(
        &self,
        endpoint: &str,
        name: &str,
        path: &str,
    ) -> Result<(String, Provenance), ResolveError> {
        match self.registry.lookup(name) {
            Some(Lookup::BaseUrl(base)) => Ok((format!("{base}{path}"), Provenance::Registry)),
            Some(Lookup::StaticHost(host)) => {
                Ok((format!("ws://{host}{path}"), Provenance::StaticTable))
            }
            Some(Lookup::DefaultHost(host)) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    backend = %name,
                    host = %host,
                    "Unknown backend name, using default host"
                );
                Ok((format!("ws://{host}{path}"), Provenance::DefaultHost))
            }
            None => Err(ResolveError::UnknownBackend {
                name: name.to_owned(),
                available: self.registry.available(),
            }),
        }
    }
}

/// Legacy shape: first backend, first host, `http(s)` → `ws(s)`.
fn from_host_list(backends: &[BackendConfig]) -> Result<(String, Provenance), ResolveError> {
    let backend = backends.first().ok_or(ResolveError::NoBackend)?;
    let host = backend.host.first().ok_or(ResolveError::NoHost)?;

    let parsed = Url::parse(host).map_err(|e| ResolveError::InvalidHost {
        host: host.clone(),
        reason: e.to_string(),
    })?;
    let hostname = parsed.host_str().ok_or_else(|| ResolveError::InvalidHost {
        host: host.clone(),
        reason: "missing hostname".to_string(),
    })?;

    let scheme = if parsed.scheme() == "https" { "wss" } else { "ws" };
    let authority = match parsed.port() {
        Some(port) => format!("{hostname}:{port}"),
        None => hostname.to_string(),
    };

    Ok((
        format!("{scheme}://{authority}{}", backend.url_pattern),
        Provenance::HostList,
    ))
}
