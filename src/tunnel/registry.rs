//! Backend name → address registry.
//!
//! Built once from the gateway-level `extra_config.websocket_backends`
//! namespace before the server starts, then shared read-only behind an `Arc`.
//!
//! ```toml
//! [extra_config.websocket_backends]
//! default_host = "localhost:8080"   # omit with strict = true
//! strict = false
//!
//! [extra_config.websocket_backends.backends]
//! chat = "ws://chat.internal:9000"
//!
//! [extra_config.websocket_backends.fallback_hosts]
//! albus = "localhost:3000"
//! ```

use std::collections::HashMap;

use serde_json::Value;

use crate::config::ExtraConfig;

/// Namespace key inside the gateway-level `extra_config`.
pub const REGISTRY_NAMESPACE: &str = "websocket_backends";

/// Host used for names found nowhere else, unless the registry is strict.
pub const DEFAULT_FALLBACK_HOST: &str = "localhost:8080";

/// Built-in name → host table consulted after the registry.
pub const BUILTIN_FALLBACK_HOSTS: &[(&str, &str)] = &[("albus", "localhost:3000")];

/// Where a registry lookup found its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// Configured base URL (`scheme://host[:port]`).
    BaseUrl(&'a str),
    /// Bare `host[:port]` from the fallback table.
    StaticHost(&'a str),
    /// Bare `host[:port]` used for unknown names.
    DefaultHost(&'a str),
}

/// Immutable backend registry.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, String>,
    fallback_hosts: HashMap<String, String>,
    default_host: Option<String>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self {
            backends: HashMap::new(),
            fallback_hosts: BUILTIN_FALLBACK_HOSTS
                .iter()
                .map(|(name, host)| (name.to_string(), host.to_string()))
                .collect(),
            default_host: Some(DEFAULT_FALLBACK_HOST.to_string()),
        }
    }
}

impl BackendRegistry {
    /// Registry with the given base URLs and the built-in fallback policy.
    pub fn new<I, K, V>(backends: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            backends: backends
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Build from the gateway-level extra config.
    ///
    /// A missing or malformed namespace yields an empty registry with the
    /// built-in fallback policy. Non-string entries are skipped.
    pub fn from_extra_config(extra: &ExtraConfig) -> Self {
        let mut registry = Self::default();
        let Some(namespace) = extra.get(REGISTRY_NAMESPACE).and_then(Value::as_object) else {
            return registry;
        };

        if let Some(backends) = namespace.get("backends").and_then(Value::as_object) {
            registry.backends = string_entries(backends);
        }
        if let Some(hosts) = namespace.get("fallback_hosts").and_then(Value::as_object) {
            registry.fallback_hosts = string_entries(hosts);
        }
        if let Some(host) = namespace.get("default_host").and_then(Value::as_str) {
            registry.default_host = Some(host.to_owned()).filter(|h| !h.is_empty());
        }
        if namespace.get("strict").and_then(Value::as_bool) == Some(true) {
            registry.default_host = None;
        }

        registry
    }

    /// Disable the default host so unknown names fail resolution.
    pub fn strict(mut self) -> Self {
        self.default_host = None;
        self
    }

    /// Replace the fallback name → host table.
    pub fn with_fallback_hosts<I, K, V>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.fallback_hosts = hosts
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn is_strict(&self) -> bool {
        self.default_host.is_none()
    }

    /// Look up a backend name, walking registry, fallback table, default host.
    pub fn lookup(&self, name: &str) -> Option<Lookup<'_>> {
        if let Some(url) = self.backends.get(name) {
            return Some(Lookup::BaseUrl(url));
        }
        if let Some(host) = self.fallback_hosts.get(name) {
            return Some(Lookup::StaticHost(host));
        }
        self.default_host.as_deref().map(Lookup::DefaultHost)
    }

    /// Configured backend names, sorted, for diagnostics.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<_> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

fn string_entries(map: &serde_json::Map<String, Value>) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(name, value)| value.as_str().map(|v| (name.clone(), v.to_owned())))
        .collect()
}
