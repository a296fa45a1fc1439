//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Routing, retries and reloads produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters)
//!     → tracing.rs (route decorators applied to spans)
//!
//! Consumers:
//!     → stdout (human readable or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The library only emits events; the binary installs subscribers and exporters
//! - Metrics are cheap (atomic increments) and no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
pub mod tracing;
