//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy paths produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (per-request spans with request IDs)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - No subscriber installed means diagnostics are dropped, never fatal
//! - Request ID flows into spawned tunnel and relay tasks
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod tracing;
