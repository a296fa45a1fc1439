//! Compiled route rules.
//!
//! A rule pairs match conditions with an action and the per-route policies.
//! Rules are built once from config and shared by every entry resolved from them.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};

use crate::config::loader::ConfigError;
use crate::config::schema::{RedirectConfig, RouteConfig};
use crate::policy::{
    CorsPolicy, Decorator, HashPolicy, OpaqueConfig, Priority, RateLimitPolicy, RetryPolicy,
    ShadowPolicy,
};
use crate::routing::headers::{header_name, header_pairs, RequestHeaders};
use crate::routing::matcher::{AndMatcher, HeaderMatcher, Matcher, PathMatcher, RuntimeMatcher};
use crate::routing::route::RedirectEntry;
use crate::routing::weighted::WeightedClusters;
use crate::runtime::Runtime;

/// What a matching rule does with the request.
#[derive(Debug)]
pub enum RouteAction {
    Cluster(String),
    /// Cluster name taken from a request header.
    ClusterHeader(HeaderName),
    Weighted(WeightedClusters),
    Redirect(RedirectEntry),
}

#[derive(Debug)]
pub struct RouteRule {
    path: PathMatcher,
    conditions: AndMatcher,
    action: RouteAction,
    prefix_rewrite: Option<String>,
    host_rewrite: Option<String>,
    auto_host_rewrite: bool,
    timeout: Duration,
    priority: Priority,
    retry_policy: RetryPolicy,
    shadow_policy: ShadowPolicy,
    hash_policy: Option<HashPolicy>,
    cors_policy: Option<CorsPolicy>,
    rate_limit_policy: RateLimitPolicy,
    include_vh_rate_limits: bool,
    use_websocket: bool,
    request_headers_to_add: Vec<(HeaderName, HeaderValue)>,
    opaque_config: OpaqueConfig,
    decorator: Option<Decorator>,
    uses_runtime: bool,
}

impl RouteRule {
    pub fn from_config(config: &RouteConfig, runtime: &Arc<dyn Runtime>) -> Result<Self, ConfigError> {
        let path = PathMatcher::from_parts(
            config.prefix.as_deref(),
            config.path.as_deref(),
            config.case_sensitive,
        );

        let mut conditions = AndMatcher::default();
        for header in &config.headers {
            conditions.push(Box::new(HeaderMatcher::new(
                header_name(&header.name)?,
                header.value.clone(),
            )));
        }
        if let Some(gate) = &config.runtime {
            conditions.push(Box::new(RuntimeMatcher::new(
                gate.key.clone(),
                gate.default,
                runtime.clone(),
            )));
        }

        let action = if let Some(cluster) = &config.cluster {
            RouteAction::Cluster(cluster.clone())
        } else if let Some(name) = &config.cluster_header {
            RouteAction::ClusterHeader(header_name(name)?)
        } else if let Some(weighted) = &config.weighted_clusters {
            RouteAction::Weighted(WeightedClusters::from_config(weighted, runtime.clone()))
        } else if let Some(redirect) = &config.redirect {
            RouteAction::Redirect(redirect_entry(redirect))
        } else {
            return Err(ConfigError::MissingAction);
        };

        let retry_policy = match &config.retry_policy {
            Some(retry) => RetryPolicy::from_config(retry)?,
            None => RetryPolicy::default(),
        };
        let shadow_policy = ShadowPolicy::from_config(config.shadow.as_ref());

        let uses_runtime = config.runtime.is_some()
            || matches!(&action, RouteAction::Weighted(w) if w.uses_runtime())
            || !shadow_policy.runtime_key().is_empty();

        Ok(Self {
            path,
            conditions,
            action,
            prefix_rewrite: config.prefix_rewrite.clone(),
            host_rewrite: config.host_rewrite.clone(),
            auto_host_rewrite: config.auto_host_rewrite,
            timeout: Duration::from_millis(config.timeout_ms),
            priority: config.priority,
            retry_policy,
            shadow_policy,
            hash_policy: config
                .hash_policy
                .as_ref()
                .map(HashPolicy::from_config)
                .transpose()?,
            cors_policy: config.cors.as_ref().map(CorsPolicy::from_config),
            rate_limit_policy: RateLimitPolicy::from_config(&config.rate_limits),
            include_vh_rate_limits: config.include_vh_rate_limits,
            use_websocket: config.use_websocket,
            request_headers_to_add: header_pairs(&config.request_headers_to_add)?,
            opaque_config: OpaqueConfig::from(&config.opaque_config),
            decorator: config.decorator.as_ref().map(Decorator::from_config),
            uses_runtime,
        })
    }

    /// Path, header and runtime conditions, in that order.
    pub fn matches(&self, headers: &RequestHeaders, random_seed: u64) -> bool {
        self.path.matches(headers, random_seed) && self.conditions.matches(headers, random_seed)
    }

    /// Upstream cluster for a matched request. `None` for redirects, an absent
    /// cluster header, or a split whose weights are all zero.
    pub fn cluster_for(&self, headers: &RequestHeaders, random_seed: u64) -> Option<String> {
        match &self.action {
            RouteAction::Cluster(name) => Some(name.clone()),
            RouteAction::ClusterHeader(header) => headers
                .header(header)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            RouteAction::Weighted(split) => split.select(random_seed).map(|c| c.name().to_string()),
            RouteAction::Redirect(_) => None,
        }
    }

    pub fn action(&self) -> &RouteAction {
        &self.action
    }

    pub fn path_matcher(&self) -> &PathMatcher {
        &self.path
    }

    pub fn prefix_rewrite(&self) -> Option<&str> {
        self.prefix_rewrite.as_deref()
    }

    pub fn host_rewrite(&self) -> Option<&str> {
        self.host_rewrite.as_deref()
    }

    pub fn auto_host_rewrite(&self) -> bool {
        self.auto_host_rewrite
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn shadow_policy(&self) -> &ShadowPolicy {
        &self.shadow_policy
    }

    pub fn hash_policy(&self) -> Option<&HashPolicy> {
        self.hash_policy.as_ref()
    }

    pub fn cors_policy(&self) -> Option<&CorsPolicy> {
        self.cors_policy.as_ref()
    }

    pub fn rate_limit_policy(&self) -> &RateLimitPolicy {
        &self.rate_limit_policy
    }

    pub fn include_vh_rate_limits(&self) -> bool {
        self.include_vh_rate_limits
    }

    pub fn use_websocket(&self) -> bool {
        self.use_websocket
    }

    pub fn request_headers_to_add(&self) -> &[(HeaderName, HeaderValue)] {
        &self.request_headers_to_add
    }

    pub fn opaque_config(&self) -> &OpaqueConfig {
        &self.opaque_config
    }

    pub fn decorator(&self) -> Option<&Decorator> {
        self.decorator.as_ref()
    }

    /// True if matching or cluster selection consults the runtime.
    pub fn uses_runtime(&self) -> bool {
        self.uses_runtime
    }
}

fn redirect_entry(config: &RedirectConfig) -> RedirectEntry {
    RedirectEntry::new(
        config.host_redirect.clone(),
        config.path_redirect.clone(),
        config.https_redirect,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{HeaderMatcherConfig, RuntimeGateConfig};
    use crate::runtime::InMemoryRuntime;

    fn runtime() -> Arc<dyn Runtime> {
        Arc::new(InMemoryRuntime::new())
    }

    #[test]
    fn test_cluster_header_action() {
        let rule = RouteRule::from_config(
            &RouteConfig {
                prefix: Some("/".into()),
                cluster_header: Some("x-target".into()),
                ..Default::default()
            },
            &runtime(),
        )
        .unwrap();

        let with = RequestHeaders::get("svc", "/").with_header("x-target", HeaderValue::from_static("blue"));
        assert_eq!(rule.cluster_for(&with, 0).as_deref(), Some("blue"));
        assert_eq!(rule.cluster_for(&RequestHeaders::get("svc", "/"), 0), None);
    }

    #[test]
    fn test_conditions_and_runtime_flag() {
        let rule = RouteRule::from_config(
            &RouteConfig {
                prefix: Some("/beta".into()),
                cluster: Some("beta".into()),
                headers: vec![HeaderMatcherConfig {
                    name: "x-user".into(),
                    value: None,
                }],
                runtime: Some(RuntimeGateConfig {
                    key: "beta.enabled".into(),
                    default: 100,
                }),
                ..Default::default()
            },
            &runtime(),
        )
        .unwrap();

        assert!(rule.uses_runtime());
        let user = RequestHeaders::get("svc", "/beta/x").with_header("x-user", HeaderValue::from_static("1"));
        assert!(rule.matches(&user, 7));
        assert!(!rule.matches(&RequestHeaders::get("svc", "/beta/x"), 7));
    }

    #[test]
    fn test_policies_default_when_unset() {
        let rule = RouteRule::from_config(
            &RouteConfig {
                cluster: Some("c".into()),
                ..Default::default()
            },
            &runtime(),
        )
        .unwrap();

        assert!(rule.retry_policy().retry_on().is_empty());
        assert!(rule.shadow_policy().cluster().is_empty());
        assert!(rule.hash_policy().is_none());
        assert_eq!(rule.timeout(), Duration::from_secs(15));
        assert!(!rule.uses_runtime());
    }
}
