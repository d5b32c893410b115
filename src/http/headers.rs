//! Header inspection and hop-by-hop stripping.

use axum::http::header::{
    HeaderName, ACCEPT_ENCODING, CONNECTION, CONTENT_TYPE, PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION, TRANSFER_ENCODING, UPGRADE,
};
use axum::http::HeaderMap;

/// Non-standard header some clients send instead of `Connection`.
pub static PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// True if any value of `name` contains `token`.
///
/// Values are split on `,` and `;` and compared case-insensitively, so
/// `Connection: keep-alive, Upgrade` contains `upgrade`.
pub fn header_contains(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split([',', ';']))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// `Upgrade: websocket` together with `Connection: upgrade`.
pub fn is_websocket_handshake(headers: &HeaderMap) -> bool {
    header_contains(headers, &UPGRADE, "websocket") && header_contains(headers, &CONNECTION, "upgrade")
}

/// Remove headers that must not travel upstream.
///
/// `Connection` survives on WebSocket handshakes since the upstream needs it
/// to agree to the upgrade.
pub fn remove_hop_by_hop(headers: &mut HeaderMap) {
    if !is_websocket_handshake(headers) {
        headers.remove(CONNECTION);
    }
    headers.remove(ACCEPT_ENCODING);
    headers.remove(&PROXY_CONNECTION);
    headers.remove(PROXY_AUTHENTICATE);
    headers.remove(PROXY_AUTHORIZATION);
}

/// Responses whose chunks must reach the client as soon as they arrive.
pub fn needs_flusher(headers: &HeaderMap) -> bool {
    header_contains(headers, &TRANSFER_ENCODING, "chunked")
        || header_contains(headers, &CONTENT_TYPE, "text/event-stream")
}
