//! Default transport: a pooled `hyper_util` client per dialer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use super::{DialerConnector, RoundTrip, TransportMaker};
use crate::dialer::ContextDialer;
use crate::error::{BoxError, ProxyError};

/// Client over a dialer-bound connector, with TLS for `https` targets.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpsConnector<DialerConnector>, Body>,
}

impl HttpTransport {
    /// The ring provider is selected explicitly since more than one rustls
    /// provider may be compiled into the binary.
    pub fn new(
        dialer: Arc<dyn ContextDialer>,
        pool_idle_timeout: Duration,
        pool_max_idle_per_host: usize,
    ) -> Result<Self, rustls::Error> {
        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .wrap_connector(DialerConnector::new(dialer));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .pool_timer(TokioTimer::new())
            .build(connector);

        Ok(Self { client })
    }
}

#[async_trait]
impl RoundTrip for HttpTransport {
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProxyError::RoundTrip(Box::new(e)))?;
        Ok(response.map(Body::new))
    }
}

/// Builds an [`HttpTransport`] per dialer with shared pool settings.
#[derive(Debug, Clone)]
pub struct DefaultTransportMaker {
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
}

impl DefaultTransportMaker {
    pub fn new(pool_idle_timeout: Duration, pool_max_idle_per_host: usize) -> Self {
        Self {
            pool_idle_timeout,
            pool_max_idle_per_host,
        }
    }
}

impl Default for DefaultTransportMaker {
    fn default() -> Self {
        Self::new(Duration::from_secs(90), 32)
    }
}

impl TransportMaker for DefaultTransportMaker {
    fn make_transport(&self, dialer: Arc<dyn ContextDialer>) -> Result<Arc<dyn RoundTrip>, BoxError> {
        let transport =
            HttpTransport::new(dialer, self.pool_idle_timeout, self.pool_max_idle_per_host)?;
        Ok(Arc::new(transport))
    }
}
