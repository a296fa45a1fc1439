//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (authority, path, headers, random seed)
//!     → table.rs (virtual host lookup)
//!     → virtual_host.rs (TLS requirement, ordered rule scan)
//!     → rule.rs + matcher.rs (evaluate match conditions)
//!     → weighted.rs (pick a cluster when traffic is split)
//!     → Return: Route::Entry, Route::Redirect, or None
//!
//! Route Compilation (at startup and on reload):
//!     RouterConfig
//!     → Validate
//!     → Compile matchers and policies
//!     → Freeze as immutable RouteTable
//!     → Publish through RouteTableHandle
//! ```
//!
//! # Design Decisions
//! - Tables compiled once, immutable at runtime
//! - No regex in hot path (prefix and exact matching only)
//! - Deterministic: same headers and seed always match the same route
//! - First match wins (declaration order)

pub mod entry;
pub mod error;
pub mod headers;
pub mod matcher;
pub mod route;
pub mod rule;
pub mod table;
pub mod virtual_host;
pub mod weighted;

pub use entry::RouteEntry;
pub use error::RouteError;
pub use headers::{RequestHeaders, RequestInfo, ResponseHeaders};
pub use route::{RedirectEntry, Route};
pub use table::{RouteTable, RouteTableHandle};
pub use virtual_host::{TlsRequirement, VirtualHost};
pub use weighted::{select_by_weight, WeightedClusters};
