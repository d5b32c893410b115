//! Per-request spans.
//!
//! Every proxied request gets a UUID v4 request ID. Tasks spawned on its
//! behalf (tunnel relays, WebSocket splices) are instrumented with the same
//! span so their log lines carry the ID.

use axum::http::{Method, Uri};
use tracing::Span;
use uuid::Uuid;

/// Span for one inbound request.
pub fn request_span(method: &Method, uri: &Uri) -> Span {
    let request_id = Uuid::new_v4();
    tracing::info_span!(
        "proxy_request",
        request_id = %request_id,
        method = %method,
        target = %uri,
    )
}
