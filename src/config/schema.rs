//! Configuration schema definitions.
//!
//! This module defines the complete route table configuration.
//! All types derive Serde traits for deserialization from config files.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::policy::Priority;
use crate::routing::TlsRequirement;

/// Root configuration for the route engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Virtual hosts, evaluated by domain.
    pub virtual_hosts: Vec<VirtualHostConfig>,

    /// Headers stripped from requests that do not come from an internal source.
    pub internal_only_headers: Vec<String>,

    /// Headers added to every request after route-level and host-level headers.
    pub request_headers_to_add: Vec<HeaderValueConfig>,

    /// Headers added to every response that transits the router.
    pub response_headers_to_add: Vec<HeaderValueConfig>,

    /// Upstream headers stripped from every response.
    pub response_headers_to_remove: Vec<String>,

    /// Initial runtime values (feature percentages, weight overrides).
    pub runtime: HashMap<String, u64>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// A header name/value pair.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HeaderValueConfig {
    pub key: String,
    pub value: String,
}

/// Virtual host configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirtualHostConfig {
    /// Unique virtual host name for logging/metrics.
    pub name: String,

    /// Domains served by this host: exact, `*.suffix` / `*suffix` or `*`.
    pub domains: Vec<String>,

    /// Route rules in evaluation order.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Stat-tracking matchers, independent of the routes.
    #[serde(default)]
    pub virtual_clusters: Vec<VirtualClusterConfig>,

    /// Whether plain-text requests get redirected to https.
    #[serde(default)]
    pub require_tls: TlsRequirement,

    #[serde(default)]
    pub cors: Option<CorsConfig>,

    #[serde(default)]
    pub rate_limits: Vec<RateLimitConfig>,

    #[serde(default)]
    pub request_headers_to_add: Vec<HeaderValueConfig>,
}

/// A single route rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Path prefix to match.
    pub prefix: Option<String>,

    /// Exact path to match (query string ignored).
    pub path: Option<String>,

    /// Path matching is case-sensitive unless set to false.
    #[serde(default = "default_true")]
    pub case_sensitive: bool,

    /// Additional header conditions, all of which must match.
    pub headers: Vec<HeaderMatcherConfig>,

    /// Runtime gate: the route only matches for the enabled share of requests.
    pub runtime: Option<RuntimeGateConfig>,

    /// Target cluster name.
    pub cluster: Option<String>,

    /// Request header carrying the target cluster name.
    pub cluster_header: Option<String>,

    /// Weighted split across several clusters.
    pub weighted_clusters: Option<WeightedClustersConfig>,

    /// Redirect instead of forwarding.
    pub redirect: Option<RedirectConfig>,

    /// Replacement for the matched path portion.
    pub prefix_rewrite: Option<String>,

    /// Static authority to forward with.
    pub host_rewrite: Option<String>,

    /// Rewrite the authority to the selected upstream host.
    pub auto_host_rewrite: bool,

    /// Upstream timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    pub priority: Priority,

    pub retry_policy: Option<RetryPolicyConfig>,

    pub shadow: Option<ShadowConfig>,

    pub hash_policy: Option<HashPolicyConfig>,

    pub cors: Option<CorsConfig>,

    pub rate_limits: Vec<RateLimitConfig>,

    /// Also evaluate the virtual host's rate limits for this route.
    pub include_vh_rate_limits: bool,

    pub use_websocket: bool,

    pub request_headers_to_add: Vec<HeaderValueConfig>,

    /// Opaque key/value data handed through to filters.
    pub opaque_config: BTreeMap<String, OneOrMany>,

    pub decorator: Option<DecoratorConfig>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            path: None,
            case_sensitive: true,
            headers: Vec::new(),
            runtime: None,
            cluster: None,
            cluster_header: None,
            weighted_clusters: None,
            redirect: None,
            prefix_rewrite: None,
            host_rewrite: None,
            auto_host_rewrite: false,
            timeout_ms: default_timeout_ms(),
            priority: Priority::Default,
            retry_policy: None,
            shadow: None,
            hash_policy: None,
            cors: None,
            rate_limits: Vec::new(),
            include_vh_rate_limits: false,
            use_websocket: false,
            request_headers_to_add: Vec::new(),
            opaque_config: BTreeMap::new(),
            decorator: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    15_000
}

/// Header condition: presence only, or exact value.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderMatcherConfig {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Runtime gate for a route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeGateConfig {
    pub key: String,
    /// Percentage enabled when the key is unset.
    pub default: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeightedClustersConfig {
    pub clusters: Vec<WeightedClusterConfig>,
    /// When set, `<prefix>.<cluster>` overrides each weight from the runtime.
    #[serde(default)]
    pub runtime_key_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeightedClusterConfig {
    pub name: String,
    pub weight: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RedirectConfig {
    pub host_redirect: Option<String>,
    pub path_redirect: Option<String>,
    pub https_redirect: bool,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicyConfig {
    /// Comma separated triggers, e.g. `"5xx,connect-failure"`.
    pub retry_on: String,

    /// Maximum number of retries.
    #[serde(default = "default_num_retries")]
    pub num_retries: u32,

    /// Per attempt timeout in milliseconds, 0 for none.
    #[serde(default)]
    pub per_try_timeout_ms: u64,
}

fn default_num_retries() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShadowConfig {
    pub cluster: String,
    #[serde(default)]
    pub runtime_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HashPolicyConfig {
    pub header_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: Vec<String>,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
    pub max_age: String,
    pub allow_credentials: Option<bool>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Rate limit descriptor, opaque to routing.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RateLimitConfig {
    pub stage: u32,
    pub disable_key: Option<String>,
    pub actions: Vec<String>,
}

/// Virtual cluster definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirtualClusterConfig {
    pub name: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecoratorConfig {
    pub operation: String,
}

/// A single string or a list of strings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn values(&self) -> Vec<String> {
        match self {
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(vs) => vs.clone(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_route_defaults() {
        let cfg: RouterConfig = toml::from_str(
            r#"
            [[virtual_hosts]]
            name = "svc"
            domains = ["*"]

            [[virtual_hosts.routes]]
            prefix = "/api"
            cluster = "backend"
            "#,
        )
        .unwrap();

        let route = &cfg.virtual_hosts[0].routes[0];
        assert_eq!(route.timeout_ms, 15_000);
        assert!(route.case_sensitive);
        assert_eq!(route.priority, Priority::Default);
        assert!(route.retry_policy.is_none());
        assert_eq!(cfg.virtual_hosts[0].require_tls, TlsRequirement::None);
    }

    #[test]
    fn test_opaque_config_one_or_many() {
        let cfg: RouteConfig = toml::from_str(
            r#"
            cluster = "c"
            [opaque_config]
            team = "payments"
            tags = ["a", "b"]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.opaque_config["team"].values(), vec!["payments"]);
        assert_eq!(cfg.opaque_config["tags"].values(), vec!["a", "b"]);
    }
}
