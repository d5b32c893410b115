//! HTTP forward / CONNECT proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ http::server (hyper http1 + upgrades)
//!                                        │
//!                 ┌──────────────────────┼─────────────────────┐
//!                 ▼                      ▼                     ▼
//!          http::tunnel           http::forward           fallback app
//!           (CONNECT)            (absolute URI)          (status page)
//!                 │                      │
//!                 ├──── auth (validator + dialer selector) ────┤
//!                 ▼                      ▼
//!          dialer::dial         transport::cache ──▶ pooled client
//!                 │                      │
//!                 ▼                      ▼
//!           net::relay             upstream HTTP(S)
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use forward_proxy::config::{load_config, ConfigWatcher, ProxyConfig};
use forward_proxy::lifecycle::{shutdown_signal, Shutdown};
use forward_proxy::observability::{logging, metrics};
use forward_proxy::{HttpServer, ProxyServer};

#[derive(Parser, Debug)]
#[command(name = "forward-proxy", version, about = "HTTP forward and CONNECT proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

/// Application served for requests addressed to the proxy itself.
fn status_page() -> Router {
    Router::new()
        .route("/", get(|| async { "This is a web proxy server.\n" }))
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let builder = ProxyServer::builder()
        .configure(&config)?
        .fallback(status_page());
    let credentials = builder.static_credentials();
    let proxy = Arc::new(builder.build());

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        auth_enabled = config.auth.enabled,
        max_transports = config.cache.max_transports,
        "Configuration loaded"
    );

    // Held for the process lifetime; dropping it stops reloads.
    let _watcher = match (&cli.config, credentials) {
        (Some(path), Some(credentials)) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            tokio::spawn(async move {
                while let Some(updated) = updates.recv().await {
                    if !updated.auth.enabled {
                        tracing::warn!("Disabling auth requires a restart, keeping current users");
                        continue;
                    }
                    credentials.replace_users(
                        updated
                            .auth
                            .users
                            .into_iter()
                            .map(|u| (u.username, u.password)),
                    );
                    tracing::info!(users = credentials.len(), "Proxy users reloaded");
                }
            });
            Some(handle)
        }
        _ => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    let server = HttpServer::with_proxy(config, proxy);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    shutdown_signal().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
