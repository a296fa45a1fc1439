//! Virtual hosts: a group of domains sharing route rules.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;
use crate::config::schema::VirtualHostConfig;
use crate::policy::{CorsPolicy, RateLimitPolicy, VirtualCluster};
use crate::routing::entry::RouteEntry;
use crate::routing::headers::{header_pairs, RequestHeaders};
use crate::routing::route::{RedirectEntry, Route};
use crate::routing::rule::{RouteAction, RouteRule};
use crate::runtime::Runtime;

/// Which requests must arrive over TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsRequirement {
    #[default]
    None,
    /// Only requests without the internal marker.
    ExternalOnly,
    All,
}

#[derive(Debug)]
pub struct VirtualHost {
    name: String,
    domains: Vec<String>,
    routes: Vec<Arc<RouteRule>>,
    virtual_clusters: Vec<VirtualCluster>,
    cors_policy: Option<CorsPolicy>,
    rate_limit_policy: RateLimitPolicy,
    require_tls: TlsRequirement,
    request_headers_to_add: Vec<(HeaderName, HeaderValue)>,
    table_request_headers: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl VirtualHost {
    /// Compile a virtual host. `table_request_headers` are the table-wide
    /// headers, applied after this host's own.
    pub fn from_config(
        config: &VirtualHostConfig,
        runtime: &Arc<dyn Runtime>,
        table_request_headers: Arc<Vec<(HeaderName, HeaderValue)>>,
    ) -> Result<Self, ConfigError> {
        let routes = config
            .routes
            .iter()
            .map(|r| RouteRule::from_config(r, runtime).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        let virtual_clusters = config
            .virtual_clusters
            .iter()
            .map(VirtualCluster::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            domains: config.domains.iter().map(|d| d.to_lowercase()).collect(),
            routes,
            virtual_clusters,
            cors_policy: config.cors.as_ref().map(CorsPolicy::from_config),
            rate_limit_policy: RateLimitPolicy::from_config(&config.rate_limits),
            require_tls: config.require_tls,
            request_headers_to_add: header_pairs(&config.request_headers_to_add)?,
            table_request_headers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn routes(&self) -> &[Arc<RouteRule>] {
        &self.routes
    }

    pub fn virtual_clusters(&self) -> &[VirtualCluster] {
        &self.virtual_clusters
    }

    pub fn cors_policy(&self) -> Option<&CorsPolicy> {
        self.cors_policy.as_ref()
    }

    pub fn rate_limit_policy(&self) -> &RateLimitPolicy {
        &self.rate_limit_policy
    }

    pub fn require_tls(&self) -> TlsRequirement {
        self.require_tls
    }

    pub fn request_headers_to_add(&self) -> &[(HeaderName, HeaderValue)] {
        &self.request_headers_to_add
    }

    pub fn table_request_headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.table_request_headers
    }

    pub fn uses_runtime(&self) -> bool {
        self.routes.iter().any(|r| r.uses_runtime())
    }

    /// First virtual cluster matching the request.
    pub fn virtual_cluster(&self, headers: &RequestHeaders) -> Option<&VirtualCluster> {
        self.virtual_clusters.iter().find(|vc| vc.matches(headers))
    }

    fn tls_required(&self, headers: &RequestHeaders) -> bool {
        let required = match self.require_tls {
            TlsRequirement::None => false,
            TlsRequirement::ExternalOnly => !headers.is_internal(),
            TlsRequirement::All => true,
        };
        required && headers.forwarded_proto() != "https"
    }

    /// Resolve a request already known to belong to this host.
    ///
    /// The first matching rule decides; later rules are never consulted, even
    /// when the winner yields no cluster.
    pub fn route(self: &Arc<Self>, headers: &RequestHeaders, random_seed: u64) -> Option<Route> {
        if self.tls_required(headers) {
            return Some(Route::Redirect(RedirectEntry::https_upgrade()));
        }

        let rule = self.routes.iter().find(|r| r.matches(headers, random_seed))?;
        if let RouteAction::Redirect(redirect) = rule.action() {
            return Some(Route::Redirect(redirect.clone()));
        }

        let cluster = rule.cluster_for(headers, random_seed)?;
        Some(Route::Entry(RouteEntry::new(rule.clone(), cluster, self.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::routing::headers::{FORWARDED_PROTO, INTERNAL};
    use crate::routing::RouteTable;
    use crate::runtime::InMemoryRuntime;

    fn secure_table() -> RouteTable {
        let config = parse_config(
            r#"
            [[virtual_hosts]]
            name = "secure"
            domains = ["secure.example.com"]
            require_tls = "all"
            [[virtual_hosts.routes]]
            prefix = "/"
            cluster = "vault"
            "#,
        )
        .unwrap();
        RouteTable::from_config(&config, Arc::new(InMemoryRuntime::new())).unwrap()
    }

    #[test]
    fn test_tls_all_redirects_internal_requests() {
        let table = secure_table();
        let internal = RequestHeaders::get("secure.example.com", "/keys")
            .with_header(INTERNAL, HeaderValue::from_static("true"));

        let route = table.route(&internal, 0).unwrap();
        assert_eq!(
            route.redirect_entry().unwrap().new_path(&internal),
            "https://secure.example.com/keys"
        );
    }

    #[test]
    fn test_tls_all_forwards_https() {
        let table = secure_table();
        let secure = RequestHeaders::get("secure.example.com", "/keys")
            .with_header(FORWARDED_PROTO, HeaderValue::from_static("https"));

        let route = table.route(&secure, 0).unwrap();
        let entry = route.route_entry().unwrap();
        assert_eq!(entry.cluster_name(), "vault");
        assert_eq!(entry.virtual_host().require_tls(), TlsRequirement::All);
    }
}
