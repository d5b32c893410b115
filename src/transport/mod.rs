//! Outbound HTTP transports bound to a dialer.
//!
//! # Data Flow
//! ```text
//! forward handler
//!     → cache.rs (one transport per dialer identity, approximate LRU)
//!     → TransportMaker::make_transport (on miss)
//!     → RoundTrip::round_trip (http.rs client over connector.rs)
//! ```
//!
//! # Design Decisions
//! - A maker that fails produces a [`FailedTransport`] which is cached like
//!   any other transport. A persistently broken dialer then costs one slot,
//!   not one construction attempt per request.

pub mod cache;
pub mod connector;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

use crate::dialer::ContextDialer;
use crate::error::{BoxError, ProxyError};

pub use cache::{TransportCache, DEFAULT_MAX_CACHED};
pub use connector::DialerConnector;
pub use http::{DefaultTransportMaker, HttpTransport};

/// Executes a single HTTP request against its absolute-form URI.
#[async_trait]
pub trait RoundTrip: Send + Sync {
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError>;
}

/// Builds a transport whose connections are opened by `dialer`.
pub trait TransportMaker: Send + Sync {
    fn make_transport(&self, dialer: Arc<dyn ContextDialer>) -> Result<Arc<dyn RoundTrip>, BoxError>;
}

/// Transport standing in for one that could not be built.
#[derive(Debug, Clone)]
pub struct FailedTransport {
    message: Arc<str>,
}

impl FailedTransport {
    pub fn new(message: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl RoundTrip for FailedTransport {
    async fn round_trip(&self, _request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        Err(ProxyError::TransportConstruction(self.message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn failed_transport_repeats_its_error() {
        let transport = FailedTransport::new("failMakeRoundTripper");
        for _ in 0..2 {
            let request = Request::get("http://example.com/").body(Body::empty()).unwrap();
            let err = transport.round_trip(request).await.unwrap_err();
            assert_eq!(err.to_string(), "failMakeRoundTripper");
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
