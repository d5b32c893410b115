//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1 with upgrades, dispatch)
//!     → tunnel.rs     CONNECT
//!       forward.rs    absolute URI (websocket.rs on 101)
//!       fallback app  everything else
//!     → response.rs (fabricated responses), body.rs (streamed bodies)
//! ```

pub mod body;
pub mod forward;
pub mod headers;
pub mod response;
pub mod server;
pub mod tunnel;
pub mod websocket;

pub use server::{HttpServer, ProxyServer, ProxyServerBuilder};
