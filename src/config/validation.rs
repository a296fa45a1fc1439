//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (one action per route, unique names)
//! - Validate value ranges (weights, retry triggers, header names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;

use crate::config::schema::{HeaderValueConfig, RouteConfig, RouterConfig, VirtualHostConfig};
use crate::policy::RetryOn;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("virtual host name `{0}` is used more than once")]
    DuplicateVirtualHost(String),

    #[error("virtual host `{0}` has no domains")]
    NoDomains(String),

    #[error("domain `{domain}` is claimed by more than one virtual host")]
    DuplicateDomain { domain: String },

    #[error("only one virtual host may use the `*` domain")]
    MultipleDefaultHosts,

    #[error("route {index} in `{virtual_host}` must set exactly one of cluster, cluster_header, weighted_clusters or redirect")]
    RouteAction { virtual_host: String, index: usize },

    #[error("route {index} in `{virtual_host}` must set at most one of prefix or path")]
    PathMatch { virtual_host: String, index: usize },

    #[error("route {index} in `{virtual_host}` has weighted clusters with zero total weight")]
    ZeroWeight { virtual_host: String, index: usize },

    #[error("route {index} in `{virtual_host}` has unknown retry trigger `{token}`")]
    RetryOn {
        virtual_host: String,
        index: usize,
        token: String,
    },

    #[error("virtual cluster `{name}` has invalid method `{method}`")]
    Method { name: String, method: String },

    #[error("invalid header name `{0}`")]
    HeaderName(String),

    #[error("invalid value for header `{0}`")]
    HeaderValue(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();
    let mut domains = HashSet::new();
    let mut default_hosts = 0;

    for vhost in &config.virtual_hosts {
        if !names.insert(vhost.name.as_str()) {
            errors.push(ValidationError::DuplicateVirtualHost(vhost.name.clone()));
        }
        if vhost.domains.is_empty() {
            errors.push(ValidationError::NoDomains(vhost.name.clone()));
        }
        for domain in &vhost.domains {
            let domain = domain.to_lowercase();
            if domain == "*" {
                default_hosts += 1;
                continue;
            }
            if !domains.insert(domain.clone()) {
                errors.push(ValidationError::DuplicateDomain { domain });
            }
        }
        validate_virtual_host(vhost, &mut errors);
    }

    if default_hosts > 1 {
        errors.push(ValidationError::MultipleDefaultHosts);
    }

    for name in config
        .internal_only_headers
        .iter()
        .chain(config.response_headers_to_remove.iter())
    {
        check_header_name(name, &mut errors);
    }
    check_header_pairs(&config.request_headers_to_add, &mut errors);
    check_header_pairs(&config.response_headers_to_add, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_virtual_host(vhost: &VirtualHostConfig, errors: &mut Vec<ValidationError>) {
    check_header_pairs(&vhost.request_headers_to_add, errors);

    for cluster in &vhost.virtual_clusters {
        if let Some(method) = &cluster.method {
            if Method::from_bytes(method.to_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::Method {
                    name: cluster.name.clone(),
                    method: method.clone(),
                });
            }
        }
    }

    for (index, route) in vhost.routes.iter().enumerate() {
        validate_route(&vhost.name, index, route, errors);
    }
}

fn validate_route(
    virtual_host: &str,
    index: usize,
    route: &RouteConfig,
    errors: &mut Vec<ValidationError>,
) {
    let actions = [
        route.cluster.is_some(),
        route.cluster_header.is_some(),
        route.weighted_clusters.is_some(),
        route.redirect.is_some(),
    ];
    if actions.iter().filter(|set| **set).count() != 1 {
        errors.push(ValidationError::RouteAction {
            virtual_host: virtual_host.to_string(),
            index,
        });
    }

    if route.prefix.is_some() && route.path.is_some() {
        errors.push(ValidationError::PathMatch {
            virtual_host: virtual_host.to_string(),
            index,
        });
    }

    if let Some(weighted) = &route.weighted_clusters {
        let total = weighted
            .clusters
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.weight));
        if total == 0 && weighted.runtime_key_prefix.is_none() {
            errors.push(ValidationError::ZeroWeight {
                virtual_host: virtual_host.to_string(),
                index,
            });
        }
    }

    if let Some(retry) = &route.retry_policy {
        if let Err(token) = RetryOn::parse_strict(&retry.retry_on) {
            errors.push(ValidationError::RetryOn {
                virtual_host: virtual_host.to_string(),
                index,
                token,
            });
        }
    }

    for matcher in &route.headers {
        check_header_name(&matcher.name, errors);
    }
    if let Some(name) = &route.cluster_header {
        check_header_name(name, errors);
    }
    if let Some(hash) = &route.hash_policy {
        check_header_name(&hash.header_name, errors);
    }
    check_header_pairs(&route.request_headers_to_add, errors);
}

fn check_header_name(name: &str, errors: &mut Vec<ValidationError>) {
    if HeaderName::from_bytes(name.as_bytes()).is_err() {
        errors.push(ValidationError::HeaderName(name.to_string()));
    }
}

fn check_header_pairs(pairs: &[HeaderValueConfig], errors: &mut Vec<ValidationError>) {
    for pair in pairs {
        check_header_name(&pair.key, errors);
        if HeaderValue::from_str(&pair.value).is_err() {
            errors.push(ValidationError::HeaderValue(pair.key.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RetryPolicyConfig, WeightedClusterConfig, WeightedClustersConfig};

    fn vhost(name: &str, domains: &[&str], routes: Vec<RouteConfig>) -> VirtualHostConfig {
        VirtualHostConfig {
            name: name.to_string(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            routes,
            virtual_clusters: Vec::new(),
            require_tls: Default::default(),
            cors: None,
            rate_limits: Vec::new(),
            request_headers_to_add: Vec::new(),
        }
    }

    fn cluster_route(cluster: &str) -> RouteConfig {
        RouteConfig {
            prefix: Some("/".into()),
            cluster: Some(cluster.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let config = RouterConfig {
            virtual_hosts: vec![vhost("svc", &["*"], vec![cluster_route("backend")])],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut no_action = cluster_route("x");
        no_action.cluster = None;

        let mut bad_retry = cluster_route("x");
        bad_retry.retry_policy = Some(RetryPolicyConfig {
            retry_on: "5xx,sometimes".into(),
            num_retries: 1,
            per_try_timeout_ms: 0,
        });

        let mut zero = cluster_route("x");
        zero.cluster = None;
        zero.weighted_clusters = Some(WeightedClustersConfig {
            clusters: vec![WeightedClusterConfig { name: "a".into(), weight: 0 }],
            runtime_key_prefix: None,
        });

        let config = RouterConfig {
            virtual_hosts: vec![
                vhost("a", &["*"], vec![no_action, bad_retry, zero]),
                vhost("a", &["*", "Example.com"], vec![]),
                vhost("b", &["example.com"], vec![]),
            ],
            ..Default::default()
        };

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateVirtualHost("a".into())));
        assert!(errors.contains(&ValidationError::MultipleDefaultHosts));
        assert!(errors.contains(&ValidationError::DuplicateDomain {
            domain: "example.com".into()
        }));
        assert!(errors.contains(&ValidationError::RouteAction {
            virtual_host: "a".into(),
            index: 0
        }));
        assert!(errors.contains(&ValidationError::RetryOn {
            virtual_host: "a".into(),
            index: 1,
            token: "sometimes".into()
        }));
        assert!(errors.contains(&ValidationError::ZeroWeight {
            virtual_host: "a".into(),
            index: 2
        }));
    }

    #[test]
    fn test_huge_weights_saturate() {
        let mut huge = cluster_route("x");
        huge.cluster = None;
        huge.weighted_clusters = Some(WeightedClustersConfig {
            clusters: ["a", "b", "c"]
                .into_iter()
                .map(|name| WeightedClusterConfig {
                    name: name.into(),
                    weight: i64::MAX as u64,
                })
                .collect(),
            runtime_key_prefix: None,
        });

        let config = RouterConfig {
            virtual_hosts: vec![vhost("svc", &["*"], vec![huge])],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_bad_header_names() {
        let config = RouterConfig {
            internal_only_headers: vec!["bad header".into()],
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::HeaderName("bad header".into())]);
    }
}
