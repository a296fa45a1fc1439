//! Per-route policy value objects.
//!
//! # Data Flow
//! ```text
//! RouteConfig (serde)
//!     → retry.rs / shadow.rs / hash.rs / cors.rs / rate_limit.rs (compiled once)
//!     → owned by a route rule inside an immutable RouteTable
//!     → read by RetryState, the load balancer, shadowing, rate limiting, tracing
//! ```
//!
//! # Design Decisions
//! - All policies are immutable after construction and freely shared
//! - Every route carries a retry and a shadow policy, even when they do nothing
//! - Policies never perform I/O; they only answer questions about headers

pub mod cors;
pub mod decorator;
pub mod hash;
pub mod rate_limit;
pub mod retry;
pub mod shadow;
pub mod virtual_cluster;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::schema::OneOrMany;

pub use cors::CorsPolicy;
pub use decorator::{Decorator, Span};
pub use hash::HashPolicy;
pub use rate_limit::{RateLimitPolicy, RateLimitPolicyEntry};
pub use retry::{RetryOn, RetryPolicy, RetryTrigger};
pub use shadow::ShadowPolicy;
pub use virtual_cluster::VirtualCluster;

/// Upstream resource priority hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Default,
    High,
}

/// Opaque string multimap attached to a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpaqueConfig {
    entries: BTreeMap<String, Vec<String>>,
}

impl OpaqueConfig {
    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All pairs, ordered by key then insertion.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&BTreeMap<String, OneOrMany>> for OpaqueConfig {
    fn from(map: &BTreeMap<String, OneOrMany>) -> Self {
        Self {
            entries: map
                .iter()
                .map(|(k, v)| (k.clone(), v.values()))
                .collect(),
        }
    }
}
