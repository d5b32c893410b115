//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML, and every
//! field has a default so a minimal (or empty) file is valid.

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Outbound transport cache.
    pub cache: CacheConfig,

    pub timeouts: TimeoutConfig,

    /// Proxy authentication.
    pub auth: AuthConfig,

    /// Named dialers users can be routed through.
    pub dialers: Vec<DialerConfig>,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Transport cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached transports (one per dialer).
    pub max_transports: usize,

    /// Idle pooled connections kept per upstream host, per transport.
    pub pool_max_idle_per_host: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_transports: crate::transport::DEFAULT_MAX_CACHED,
            pool_max_idle_per_host: 32,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream TCP connect timeout.
    pub connect_secs: u64,

    /// How long pooled upstream connections stay idle before closing.
    pub idle_secs: u64,

    /// Grace period for open client connections on shutdown.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            idle_secs: 90,
            shutdown_secs: 30,
        }
    }
}

/// Proxy authentication.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Require `Proxy-Authorization` on every proxied request.
    pub enabled: bool,

    pub users: Vec<UserConfig>,
}

/// A proxy user.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,

    /// Name of the dialer this user's traffic leaves through.
    #[serde(default)]
    pub dialer: Option<String>,
}

/// A named outbound dialer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DialerConfig {
    pub name: String,

    /// Source IP for outgoing connections.
    #[serde(default)]
    pub local_address: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
