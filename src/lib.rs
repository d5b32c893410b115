//! HTTP forward and CONNECT proxy library.

pub mod auth;
pub mod config;
pub mod dialer;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod transport;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, Result};
pub use http::{HttpServer, ProxyServer, ProxyServerBuilder};
pub use lifecycle::Shutdown;
