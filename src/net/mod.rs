//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking)
//!     → hand off to the HTTP layer
//!
//! Hijacked CONNECT / WebSocket connection
//!     → relay.rs (half-close barrier or full-duplex race)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each served connection is tracked for graceful shutdown

pub mod connection;
pub mod listener;
pub mod relay;
