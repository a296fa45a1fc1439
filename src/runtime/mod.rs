//! Runtime feature values.
//!
//! # Responsibilities
//! - Supply live integer overrides keyed by name
//! - Turn a percentage plus a caller random value into an on/off decision
//!
//! # Design Decisions
//! - Lookups never fail; an unset key yields the caller's default
//! - The caller supplies randomness so repeated decisions for one request are stable

use std::collections::HashMap;

use dashmap::DashMap;

/// Source of runtime values consulted during routing.
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Integer value for `key`, or `default` when unset.
    fn get_integer(&self, key: &str, default: u64) -> u64;

    /// True for `value`% of random values, where `value` is read from `key`.
    fn feature_enabled(&self, key: &str, default: u64, random_value: u64) -> bool {
        random_value % 100 < self.get_integer(key, default).min(100)
    }
}

/// Runtime backed by a concurrent in-memory map.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    values: DashMap<String, u64>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: &HashMap<String, u64>) -> Self {
        let runtime = Self::new();
        for (key, value) in values {
            runtime.set(key.clone(), *value);
        }
        runtime
    }

    pub fn set(&self, key: impl Into<String>, value: u64) {
        self.values.insert(key.into(), value);
    }

    /// Make `values` the complete contents, dropping keys it does not name.
    pub fn replace_all(&self, values: &HashMap<String, u64>) {
        self.values.retain(|key, _| values.contains_key(key));
        for (key, value) in values {
            self.set(key.clone(), *value);
        }
    }

    pub fn remove(&self, key: &str) {
        self.values.remove(key);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Runtime for InMemoryRuntime {
    fn get_integer(&self, key: &str, default: u64) -> u64 {
        self.values.get(key).map(|v| *v).unwrap_or(default)
    }
}
