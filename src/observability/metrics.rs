//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by kind, status
//! - `proxy_request_duration_seconds` (histogram): time to response headers
//! - `proxy_active_tunnels` (gauge): open CONNECT and WebSocket relays
//! - `proxy_cached_transports` (gauge): transport cache size
//! - `proxy_transport_evictions_total` (counter): evicted transports
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - `kind` is one of `connect`, `forward`, `fallback`

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Serve Prometheus metrics on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(kind: &'static str, status: u16, start: Instant) {
    ::metrics::counter!(
        "proxy_requests_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("proxy_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_size(size: usize) {
    ::metrics::gauge!("proxy_cached_transports").set(size as f64);
}

pub fn record_cache_eviction(count: usize) {
    ::metrics::counter!("proxy_transport_evictions_total").increment(count as u64);
}

/// Counts an open relay until dropped.
#[derive(Debug)]
pub struct TunnelGuard {
    kind: &'static str,
}

pub fn tunnel_opened(kind: &'static str) -> TunnelGuard {
    ::metrics::gauge!("proxy_active_tunnels", "kind" => kind).increment(1.0);
    TunnelGuard { kind }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        ::metrics::gauge!("proxy_active_tunnels", "kind" => self.kind).decrement(1.0);
    }
}
