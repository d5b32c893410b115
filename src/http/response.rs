//! Responses the proxy fabricates itself.
//!
//! # Responsibilities
//! - The tunnel-established line for CONNECT
//! - Status-only failure lines for CONNECT
//! - Plain-text failure responses for forwarded requests
//!
//! # Design Decisions
//! - CONNECT responses are HTTP/1.0 with no body. A failure's empty body
//!   has no known length, so it is written close-delimited: the status line,
//!   a blank line, then the connection closes.
//! - Unauthorized never carries a body; other forward failures carry the
//!   error's message

use std::convert::Infallible;

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{Response, StatusCode, Version};
use bytes::Bytes;
use futures_util::stream;
use hyper::ext::ReasonPhrase;

use crate::error::ProxyError;

fn status_only(status: StatusCode, version: Version) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    *response.version_mut() = version;
    response
}

/// `HTTP/1.0 200 Connection established`.
pub fn tunnel_established() -> Response<Body> {
    let mut response = status_only(StatusCode::OK, Version::HTTP_10);
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(b"Connection established"));
    response
}

/// Failure line for a CONNECT request.
pub fn tunnel_failure(err: &ProxyError) -> Response<Body> {
    let mut response = status_only(err.status_code(), Version::HTTP_10);
    *response.body_mut() = Body::from_stream(stream::empty::<Result<Bytes, Infallible>>());
    response
}

/// Failure response for a forwarded request.
pub fn forward_failure(err: &ProxyError) -> Response<Body> {
    let status = err.status_code();
    match err {
        ProxyError::Unauthorized | ProxyError::RoundTrip(_) | ProxyError::Upgrade(_) => {
            status_only(status, Version::HTTP_11)
        }
        _ => {
            let mut response = Response::new(Body::from(err.to_string()));
            *response.status_mut() = status;
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
            response
        }
    }
}
