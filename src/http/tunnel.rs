//! CONNECT tunnels.
//!
//! # Data Flow
//! ```text
//! CONNECT host:port
//!     → take the connection's upgrade handle (hijack)
//!     → authorize, pick dialer
//!     → dial target
//!     → HTTP/1.0 200 Connection established
//!     → relay (half-close barrier for TCP pairs, full-duplex race otherwise)
//! ```
//!
//! # Design Decisions
//! - Nothing is written to the target before the client has been told the
//!   tunnel exists
//! - The relay runs on its own task; once the 200 is sent, the only way to
//!   report a failure is the log

use std::io;

use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::Instrument;

use crate::auth::{Authorizer, NETWORK_TCP};
use crate::dialer::ProxyConn;
use crate::error::ProxyError;
use crate::http::response::{tunnel_established, tunnel_failure};
use crate::net::relay::{is_closed, relay_half_close, relay_until_closed};
use crate::observability::metrics;

/// Handle a CONNECT request.
pub async fn handle_connect(authorizer: &Authorizer, mut request: Request<Body>) -> Response<Body> {
    let Some(on_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
        let err = ProxyError::HijackUnsupported;
        tracing::error!(error = %err, "Cannot take over client connection");
        return tunnel_failure(&err);
    };

    let authorization = match authorizer.resolve(request.uri(), request.headers()) {
        Ok(authorization) => authorization,
        Err(err) => {
            tracing::info!(error = %err, "CONNECT not authorized");
            return tunnel_failure(&err);
        }
    };

    let dialed = authorization
        .dialer
        .dial(NETWORK_TCP, &authorization.address)
        .await;
    let target = match dialed {
        Ok(conn) => conn,
        Err(source) => {
            let err = ProxyError::Dial {
                address: authorization.address,
                source,
            };
            tracing::warn!(error = %err, "CONNECT dial failed");
            return tunnel_failure(&err);
        }
    };

    tracing::debug!(
        address = %authorization.address,
        user = %authorization.identity.username(),
        "Tunnel target connected"
    );

    tokio::spawn(
        async move {
            let upgraded = match on_upgrade.await {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    let err = ProxyError::Upgrade(e);
                    tracing::warn!(error = %err, "Client connection was not handed over");
                    return;
                }
            };
            let (client, buffered) = hijacked(upgraded);
            if let Err(e) = relay_tunnel(client, buffered, target).await {
                let err = ProxyError::Relay(e);
                tracing::warn!(error = %err, "Tunnel closed with error");
            }
        }
        .in_current_span(),
    );

    tunnel_established()
}

/// Recover the raw client stream, plus anything hyper read past the request head.
fn hijacked(upgraded: Upgraded) -> (ProxyConn, Bytes) {
    match upgraded.downcast::<TokioIo<TcpStream>>() {
        Ok(parts) => (ProxyConn::Tcp(parts.io.into_inner()), parts.read_buf),
        Err(upgraded) => (ProxyConn::duplex(TokioIo::new(upgraded)), Bytes::new()),
    }
}

async fn relay_tunnel(client: ProxyConn, buffered: Bytes, mut target: ProxyConn) -> io::Result<()> {
    if !buffered.is_empty() {
        target.write_all(&buffered).await?;
    }

    let _tunnel = metrics::tunnel_opened("connect");
    match (client, target) {
        (ProxyConn::Tcp(client), ProxyConn::Tcp(target)) => {
            let (upstream, downstream) = relay_half_close(client, target).await;
            tracing::debug!(
                bytes_up = ?upstream.as_ref().ok(),
                bytes_down = ?downstream.as_ref().ok(),
                "Tunnel closed"
            );
            for result in [upstream, downstream] {
                if let Err(e) = result {
                    if !is_closed(e.kind()) {
                        return Err(e);
                    }
                }
            }
            Ok(())
        }
        (client, target) => {
            let result = relay_until_closed(client, target).await;
            tracing::debug!("Tunnel closed");
            result
        }
    }
}
