//! Absolute-URI forwarding.
//!
//! # Data Flow
//! ```text
//! GET http://host/path
//!     → authorize, pick dialer
//!     → transport for that dialer (cache)
//!     → strip hop-by-hop headers, re-issue upstream
//!     → 101 + websocket: splice connections
//!       chunked / event-stream: flush each chunk
//!       otherwise: stream body through
//! ```

use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{Extensions, Request, Response, StatusCode, Uri, Version};
use hyper::upgrade::OnUpgrade;

use crate::auth::Authorizer;
use crate::http::body::RelayBody;
use crate::http::headers::{is_websocket_handshake, needs_flusher, remove_hop_by_hop};
use crate::http::response::forward_failure;
use crate::http::websocket;
use crate::transport::TransportCache;

/// Handle a request whose target is an absolute URI.
pub async fn handle_forward(
    authorizer: &Authorizer,
    transports: &TransportCache,
    mut request: Request<Body>,
) -> Response<Body> {
    let authorization = match authorizer.resolve(request.uri(), request.headers()) {
        Ok(authorization) => authorization,
        Err(err) => {
            tracing::info!(error = %err, "Forward request not authorized");
            return forward_failure(&err);
        }
    };
    let transport = transports.acquire(&authorization.dialer);

    let websocket = is_websocket_handshake(request.headers());
    let downstream = if websocket {
        request.extensions_mut().remove::<OnUpgrade>()
    } else {
        None
    };

    let response = match transport.round_trip(outbound_request(request)).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, address = %authorization.address, "Upstream round trip failed");
            return forward_failure(&err);
        }
    };

    if websocket
        && response.status() == StatusCode::SWITCHING_PROTOCOLS
        && is_websocket_handshake(response.headers())
    {
        return websocket::splice(downstream, response);
    }

    let flush_each = needs_flusher(response.headers());
    response.map(|body| Body::new(RelayBody::new(body, flush_each)))
}

/// The request as it is sent upstream.
fn outbound_request(request: Request<Body>) -> Request<Body> {
    let (mut parts, body) = request.into_parts();
    parts.uri = upstream_uri(parts.uri);
    parts.version = Version::HTTP_11;
    parts.extensions = Extensions::new();
    remove_hop_by_hop(&mut parts.headers);
    Request::from_parts(parts, body)
}

/// WebSocket schemes travel as their HTTP equivalents.
fn upstream_uri(uri: Uri) -> Uri {
    let scheme = match uri.scheme_str() {
        Some(s) if s.eq_ignore_ascii_case("ws") => Scheme::HTTP,
        Some(s) if s.eq_ignore_ascii_case("wss") => Scheme::HTTPS,
        _ => return uri,
    };
    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(scheme);
    Uri::from_parts(parts).unwrap_or(uri)
}
