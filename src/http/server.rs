//! Proxy dispatch and the HTTP/1.1 accept loop.
//!
//! # Responsibilities
//! - Route each request: CONNECT → tunnel, absolute URI → forward,
//!   anything else → embedded fallback application or 404
//! - Own the per-server state (authorizer, transport cache)
//! - Serve accepted connections with upgrade support
//! - Drain open connections on shutdown

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tower::ServiceExt;
use tracing::Instrument;

use crate::auth::{Authorizer, CredentialsValidator, StaticCredentials};
use crate::config::validation::{validate_config, ValidationError};
use crate::config::{ConfigError, ProxyConfig};
use crate::dialer::{ContextDialer, DialerSelector, StaticDialerSelector, TcpDialer};
use crate::error::BoxError;
use crate::http::forward::handle_forward;
use crate::http::tunnel::handle_connect;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::observability::metrics;
use crate::observability::tracing::request_span;
use crate::transport::{DefaultTransportMaker, TransportCache, TransportMaker, DEFAULT_MAX_CACHED};

/// The proxy itself, independent of how connections reach it.
pub struct ProxyServer {
    authorizer: Authorizer,
    transports: TransportCache,
    fallback: Option<Router>,
}

impl ProxyServer {
    pub fn builder() -> ProxyServerBuilder {
        ProxyServerBuilder::default()
    }

    /// Serve one request.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Body>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let request = request.map(Body::new);
        let span = request_span(request.method(), request.uri());
        self.dispatch(request).instrument(span).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();

        let (kind, response) = if request.method() == Method::CONNECT {
            ("connect", handle_connect(&self.authorizer, request).await)
        } else if request.uri().scheme().is_some() {
            (
                "forward",
                handle_forward(&self.authorizer, &self.transports, request).await,
            )
        } else {
            ("fallback", self.serve_fallback(request).await)
        };

        tracing::debug!(kind, status = %response.status(), "Request handled");
        metrics::record_request(kind, response.status().as_u16(), start);
        response
    }

    async fn serve_fallback(&self, request: Request<Body>) -> Response<Body> {
        match &self.fallback {
            Some(app) => match app.clone().oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            },
            None => (StatusCode::NOT_FOUND, "404 page not found\n").into_response(),
        }
    }

    pub fn transports(&self) -> &TransportCache {
        &self.transports
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }
}

/// Assembles a [`ProxyServer`] from capabilities or from a [`ProxyConfig`].
pub struct ProxyServerBuilder {
    validator: Option<Arc<dyn CredentialsValidator>>,
    selector: Option<Arc<dyn DialerSelector>>,
    default_dialer: Option<Arc<dyn ContextDialer>>,
    transport_maker: Option<Arc<dyn TransportMaker>>,
    max_cached: usize,
    fallback: Option<Router>,
    static_credentials: Option<Arc<StaticCredentials>>,
}

impl Default for ProxyServerBuilder {
    fn default() -> Self {
        Self {
            validator: None,
            selector: None,
            default_dialer: None,
            transport_maker: None,
            max_cached: DEFAULT_MAX_CACHED,
            fallback: None,
            static_credentials: None,
        }
    }
}

impl ProxyServerBuilder {
    /// Require credentials, checked by `validator`.
    pub fn credentials_validator(mut self, validator: Arc<dyn CredentialsValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn dialer_selector(mut self, selector: Arc<dyn DialerSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Dialer used when no selector is configured. Defaults to [`TcpDialer`].
    pub fn default_dialer(mut self, dialer: Arc<dyn ContextDialer>) -> Self {
        self.default_dialer = Some(dialer);
        self
    }

    pub fn transport_maker(mut self, maker: Arc<dyn TransportMaker>) -> Self {
        self.transport_maker = Some(maker);
        self
    }

    pub fn max_cached_transports(mut self, max: usize) -> Self {
        self.max_cached = max;
        self
    }

    /// Application serving requests that are not proxy requests.
    pub fn fallback(mut self, app: Router) -> Self {
        self.fallback = Some(app);
        self
    }

    /// Apply dialer, cache and auth settings from a config file.
    pub fn configure(mut self, config: &ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        let default_dialer: Arc<dyn ContextDialer> = Arc::new(TcpDialer::new(connect_timeout));

        // One Arc per name so users sharing a dialer share its transport.
        let mut named: HashMap<&str, Arc<dyn ContextDialer>> = HashMap::new();
        for (i, dialer) in config.dialers.iter().enumerate() {
            let mut tcp = TcpDialer::new(connect_timeout);
            if let Some(local) = &dialer.local_address {
                let local: IpAddr = local.parse().map_err(|_| {
                    ConfigError::Validation(vec![ValidationError::new(
                        format!("dialers[{}].local_address", i),
                        format!("invalid IP address {:?}", local),
                    )])
                })?;
                tcp = tcp.with_local_address(local);
            }
            named.insert(dialer.name.as_str(), Arc::new(tcp));
        }

        if config.auth.enabled {
            let credentials = Arc::new(StaticCredentials::from_users(
                config
                    .auth
                    .users
                    .iter()
                    .map(|u| (u.username.clone(), u.password.clone())),
            ));
            self.validator = Some(credentials.clone());
            self.static_credentials = Some(credentials);

            let mut selector = StaticDialerSelector::new(Some(Arc::clone(&default_dialer)));
            for user in &config.auth.users {
                if let Some(dialer) = user.dialer.as_deref().and_then(|name| named.get(name)) {
                    selector.insert(user.username.clone(), Arc::clone(dialer));
                }
            }
            if !selector.is_empty() {
                self.selector = Some(Arc::new(selector));
            }
        }

        self.default_dialer = Some(default_dialer);
        self.transport_maker = Some(Arc::new(DefaultTransportMaker::new(
            Duration::from_secs(config.timeouts.idle_secs),
            config.cache.pool_max_idle_per_host,
        )));
        Ok(self.max_cached_transports(config.cache.max_transports))
    }

    /// The credentials table created by [`configure`](Self::configure), for live reload.
    pub fn static_credentials(&self) -> Option<Arc<StaticCredentials>> {
        self.static_credentials.clone()
    }

    pub fn build(self) -> ProxyServer {
        let default_dialer = self
            .default_dialer
            .unwrap_or_else(|| Arc::new(TcpDialer::default()));

        let mut authorizer = Authorizer::new(default_dialer);
        if let Some(validator) = self.validator {
            authorizer = authorizer.with_validator(validator);
        }
        if let Some(selector) = self.selector {
            authorizer = authorizer.with_selector(selector);
        }

        let maker = self
            .transport_maker
            .unwrap_or_else(|| Arc::new(DefaultTransportMaker::default()));

        ProxyServer {
            authorizer,
            transports: TransportCache::new(maker, self.max_cached),
            fallback: self.fallback,
        }
    }
}

/// HTTP/1.1 front end for a [`ProxyServer`].
pub struct HttpServer {
    proxy: Arc<ProxyServer>,
    config: ProxyConfig,
}

impl HttpServer {
    /// Serve an already assembled proxy. `config` supplies the listener and
    /// shutdown settings.
    pub fn with_proxy(config: ProxyConfig, proxy: Arc<ProxyServer>) -> Self {
        Self { proxy, config }
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let listener = Listener::from_tcp(listener, self.config.listener.max_connections);
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy server starting");

        let tracker = ConnectionTracker::new();
        let (stop_tx, stop_rx) = watch::channel(false);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = tracker.track(peer);
                        tokio::spawn(serve_connection(
                            Arc::clone(&self.proxy),
                            stream,
                            permit,
                            guard,
                            stop_rx.clone(),
                        ));
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }

        drop(listener);
        let _ = stop_tx.send(true);
        tracing::info!(open_connections = tracker.active_count(), "Draining connections");

        let grace = Duration::from_secs(self.config.timeouts.shutdown_secs);
        if tokio::time::timeout(grace, tracker.wait_for_shutdown()).await.is_err() {
            tracing::warn!(
                open_connections = tracker.active_count(),
                "Shutdown grace period elapsed"
            );
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

async fn serve_connection(
    proxy: Arc<ProxyServer>,
    stream: TcpStream,
    _permit: ConnectionPermit,
    guard: ConnectionGuard,
    mut stop: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    let service = service_fn(move |request: Request<Incoming>| {
        let proxy = Arc::clone(&proxy);
        async move { Ok::<_, Infallible>(proxy.handle(request).await) }
    });

    let conn = http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .auto_date_header(false)
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(connection_id = %guard.id(), peer = %guard.peer(), error = %e, "Connection error");
                }
                break;
            }
            _ = stop.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}
