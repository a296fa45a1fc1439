//! Weighted cluster selection.
//!
//! # Design Decisions
//! - Selection is a pure function of the weights and the request's random seed
//! - `seed % total` picks a point; each cluster owns `[begin, end)` of the range
//! - Zero-weight clusters own an empty range and are never picked
//! - Weights may be overridden live from the runtime

use std::sync::Arc;

use crate::config::schema::WeightedClustersConfig;
use crate::runtime::Runtime;

/// Index of the cluster owning `seed % total`, or `None` when every weight is zero.
pub fn select_by_weight(weights: &[u64], seed: u64) -> Option<usize> {
    let total = weights
        .iter()
        .fold(0u64, |acc, w| acc.saturating_add(*w));
    if total == 0 {
        return None;
    }

    let mut point = seed % total;
    for (idx, weight) in weights.iter().enumerate() {
        if point < *weight {
            return Some(idx);
        }
        point -= weight;
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedCluster {
    name: String,
    weight: u64,
}

impl WeightedCluster {
    pub fn new(name: impl Into<String>, weight: u64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured weight, before runtime overrides.
    pub fn weight(&self) -> u64 {
        self.weight
    }
}

/// A traffic split across clusters.
#[derive(Debug, Clone)]
pub struct WeightedClusters {
    clusters: Vec<WeightedCluster>,
    runtime_key_prefix: Option<String>,
    runtime: Arc<dyn Runtime>,
}

impl WeightedClusters {
    pub fn new(
        clusters: Vec<WeightedCluster>,
        runtime_key_prefix: Option<String>,
        runtime: Arc<dyn Runtime>,
    ) -> Self {
        Self {
            clusters,
            runtime_key_prefix,
            runtime,
        }
    }

    pub fn from_config(config: &WeightedClustersConfig, runtime: Arc<dyn Runtime>) -> Self {
        let clusters = config
            .clusters
            .iter()
            .map(|c| WeightedCluster::new(c.name.clone(), c.weight))
            .collect();
        Self::new(clusters, config.runtime_key_prefix.clone(), runtime)
    }

    pub fn clusters(&self) -> &[WeightedCluster] {
        &self.clusters
    }

    pub fn uses_runtime(&self) -> bool {
        self.runtime_key_prefix.is_some()
    }

    /// Weights in effect right now.
    pub fn effective_weights(&self) -> Vec<u64> {
        match &self.runtime_key_prefix {
            Some(prefix) => self
                .clusters
                .iter()
                .map(|c| {
                    self.runtime
                        .get_integer(&format!("{prefix}.{}", c.name), c.weight)
                })
                .collect(),
            None => self.clusters.iter().map(|c| c.weight).collect(),
        }
    }

    pub fn select(&self, seed: u64) -> Option<&WeightedCluster> {
        select_by_weight(&self.effective_weights(), seed).map(|idx| &self.clusters[idx])
    }
}
