//! WebSocket upgrade detection.
//!
//! # Design Decisions
//! - Header-only classification; method and body are not consulted
//! - `Connection` is a token list and may span several header lines

use axum::http::{header, HeaderMap};

/// Protocol token expected in the `Upgrade` header.
pub const WEBSOCKET_TOKEN: &str = "websocket";

/// Returns true if the headers describe a WebSocket upgrade request.
///
/// All three must hold: `Upgrade: websocket`, `Connection` listing
/// `upgrade`, and a non-empty `Sec-WebSocket-Key`.
pub fn is_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case(WEBSOCKET_TOKEN))
        .unwrap_or(false);

    let connection = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let key = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .map(|v| !v.is_empty())
        .unwrap_or(false);

    upgrade && connection && key
}
