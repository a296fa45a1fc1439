//! Request routing and retry orchestration for an L7 proxy.
//!
//! The crate answers two questions for the proxy's forwarding path: where does
//! this request go, and should this failed attempt be tried again.

pub mod config;
pub mod observability;
pub mod policy;
pub mod resilience;
pub mod routing;
pub mod runtime;

pub use config::{ConfigError, RouterConfig};
pub use resilience::{AttemptOutcome, RetryState, RetryStatus, Scheduler};
pub use routing::{RequestHeaders, Route, RouteEntry, RouteTable, RouteTableHandle};
pub use runtime::{InMemoryRuntime, Runtime};
