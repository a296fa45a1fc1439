//! Rate limit policy references.
//!
//! The rate limit service interprets the actions; routing only carries them.

use crate::config::schema::RateLimitConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitPolicyEntry {
    stage: u32,
    disable_key: Option<String>,
    actions: Vec<String>,
}

impl RateLimitPolicyEntry {
    pub fn stage(&self) -> u32 {
        self.stage
    }

    /// Runtime key that switches this entry off.
    pub fn disable_key(&self) -> Option<&str> {
        self.disable_key.as_deref()
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitPolicy {
    entries: Vec<RateLimitPolicyEntry>,
}

impl RateLimitPolicy {
    pub fn from_config(configs: &[RateLimitConfig]) -> Self {
        Self {
            entries: configs
                .iter()
                .map(|c| RateLimitPolicyEntry {
                    stage: c.stage,
                    disable_key: c.disable_key.clone(),
                    actions: c.actions.clone(),
                })
                .collect(),
        }
    }

    /// Entries for one stage, in declaration order.
    pub fn applicable(&self, stage: u32) -> impl Iterator<Item = &RateLimitPolicyEntry> {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
