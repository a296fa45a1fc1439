//! Per route policy for request shadowing.

use crate::config::schema::ShadowConfig;
use crate::runtime::Runtime;

/// Number of sampling buckets; runtime values are in 0.01% steps.
pub const SHADOW_BUCKETS: u64 = 10_000;

/// Where (and how often) a request is duplicated for shadow traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowPolicy {
    cluster: String,
    runtime_key: String,
}

impl ShadowPolicy {
    pub fn new(cluster: impl Into<String>, runtime_key: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            runtime_key: runtime_key.into(),
        }
    }

    pub fn from_config(config: Option<&ShadowConfig>) -> Self {
        match config {
            Some(c) => Self::new(c.cluster.clone(), c.runtime_key.clone().unwrap_or_default()),
            None => Self::default(),
        }
    }

    /// Target cluster; empty means no shadowing.
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Key sampled in [0, 10000); empty means every request is shadowed.
    pub fn runtime_key(&self) -> &str {
        &self.runtime_key
    }

    /// Decide for one request, given a random value.
    pub fn should_shadow(&self, runtime: &dyn Runtime, random_value: u64) -> bool {
        if self.cluster.is_empty() {
            return false;
        }
        if self.runtime_key.is_empty() {
            return true;
        }
        random_value % SHADOW_BUCKETS < runtime.get_integer(&self.runtime_key, 0)
    }
}
