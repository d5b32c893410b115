//! WebSocket upgrades through the forward path.
//!
//! # Data Flow
//! ```text
//! Client ←── raw bytes ──→ Proxy ←── raw bytes ──→ Upstream
//! ```
//!
//! # Design Decisions
//! - Frames are not parsed. Once both sides switched protocols the proxy
//!   copies bytes until either side closes
//! - An upgraded HTTP connection is one full-duplex pipe, so the relay is
//!   the first-close race, never the half-close barrier

use axum::body::Body;
use axum::http::Response;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tracing::Instrument;

use crate::error::ProxyError;
use crate::http::response::forward_failure;
use crate::net::relay::relay_until_closed;
use crate::observability::metrics;

/// Answer the client with the upstream's `101` and splice both connections.
///
/// `downstream` is the client connection's upgrade handle. Without it the
/// client cannot be switched and the request fails with 500.
pub fn splice(downstream: Option<OnUpgrade>, mut response: Response<Body>) -> Response<Body> {
    let Some(downstream) = downstream else {
        let err = ProxyError::HijackUnsupported;
        tracing::error!(error = %err, "WebSocket upgrade accepted upstream but client cannot switch");
        return forward_failure(&err);
    };

    let upstream = hyper::upgrade::on(&mut response);
    tokio::spawn(
        async move {
            let (client, server) = match tokio::try_join!(downstream, upstream) {
                Ok(pair) => pair,
                Err(e) => {
                    let err = ProxyError::Upgrade(e);
                    tracing::warn!(error = %err, "WebSocket upgrade did not complete");
                    return;
                }
            };

            let _tunnel = metrics::tunnel_opened("websocket");
            match relay_until_closed(TokioIo::new(client), TokioIo::new(server)).await {
                Ok(()) => tracing::debug!("WebSocket closed"),
                Err(e) => {
                    let err = ProxyError::Relay(e);
                    tracing::warn!(error = %err, "WebSocket relay failed");
                }
            }
        }
        .in_current_span(),
    );

    *response.body_mut() = Body::empty();
    response
}
