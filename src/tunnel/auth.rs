//! Caller identity headers forwarded to the backend handshake.
//!
//! Upstream authentication middleware injects these headers; the tunnel
//! copies them verbatim and never inspects their values.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Identity headers copied by exact (case-insensitive) name.
pub const AUTH_HEADER_NAMES: &[&str] = &[
    "X-User-Id",
    "X-User-Uid",
    "X-User-Name",
    "X-User-Email",
    "X-User-Groups",
    "X-User-Type",
    "X-Auth-Token",
    "X-Auth-User",
];

/// Name prefixes marking user, auth and group metadata.
pub const AUTH_HEADER_PREFIXES: &[&str] = &["X-User-", "X-Auth-", "X-Group-"];

/// Identity headers captured from one upgrade request, one value per name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthHeaders {
    headers: HeaderMap,
}

impl AuthHeaders {
    /// Capture identity headers from an inbound request.
    ///
    /// Multi-valued headers contribute only their first value.
    pub fn extract(headers: &HeaderMap) -> Self {
        let mut captured = HeaderMap::new();
        for name in headers.keys() {
            if !is_auth_header(name) {
                continue;
            }
            if let Some(value) = headers.get(name) {
                captured.insert(name.clone(), value.clone());
            }
        }
        Self { headers: captured }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &HeaderName> {
        self.headers.keys()
    }

    /// Copy every captured header into an outbound request's headers.
    pub fn apply_to(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

fn is_auth_header(name: &HeaderName) -> bool {
    // HeaderName is always lowercase.
    let name = name.as_str();
    AUTH_HEADER_NAMES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name))
        || AUTH_HEADER_PREFIXES.iter().any(|prefix| {
            name.len() >= prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(prefix)
        })
}
