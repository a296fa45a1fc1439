//! Route entries: a matched rule bound to one upstream cluster.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;

use crate::policy::{
    CorsPolicy, Decorator, HashPolicy, OpaqueConfig, Priority, RateLimitPolicy, RetryPolicy,
    ShadowPolicy, VirtualCluster,
};
use crate::routing::error::RouteError;
use crate::routing::headers::{RequestHeaders, RequestInfo, ORIGINAL_PATH};
use crate::routing::rule::RouteRule;
use crate::routing::virtual_host::VirtualHost;

/// Everything the forwarding path needs to know about a routed request.
///
/// Cheap to clone; the rule and the virtual host are shared with the table.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    rule: Arc<RouteRule>,
    cluster_name: String,
    virtual_host: Arc<VirtualHost>,
}

impl RouteEntry {
    pub fn new(rule: Arc<RouteRule>, cluster_name: String, virtual_host: Arc<VirtualHost>) -> Self {
        Self {
            rule,
            cluster_name,
            virtual_host,
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn priority(&self) -> Priority {
        self.rule.priority()
    }

    pub fn timeout(&self) -> Duration {
        self.rule.timeout()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.rule.retry_policy()
    }

    pub fn shadow_policy(&self) -> &ShadowPolicy {
        self.rule.shadow_policy()
    }

    pub fn hash_policy(&self) -> Option<&HashPolicy> {
        self.rule.hash_policy()
    }

    pub fn cors_policy(&self) -> Option<&CorsPolicy> {
        self.rule.cors_policy()
    }

    pub fn rate_limit_policy(&self) -> &RateLimitPolicy {
        self.rule.rate_limit_policy()
    }

    pub fn include_virtual_host_rate_limits(&self) -> bool {
        self.rule.include_vh_rate_limits()
    }

    pub fn auto_host_rewrite(&self) -> bool {
        self.rule.auto_host_rewrite()
    }

    pub fn use_websocket(&self) -> bool {
        self.rule.use_websocket()
    }

    pub fn opaque_config(&self) -> &OpaqueConfig {
        self.rule.opaque_config()
    }

    pub fn decorator(&self) -> Option<&Decorator> {
        self.rule.decorator()
    }

    pub fn virtual_host(&self) -> &Arc<VirtualHost> {
        &self.virtual_host
    }

    /// First virtual cluster of the owning host that matches the request.
    pub fn virtual_cluster(&self, headers: &RequestHeaders) -> Option<&VirtualCluster> {
        self.virtual_host.virtual_cluster(headers)
    }

    /// Rewrite `headers` for forwarding. Runs at most once per request.
    ///
    /// Applies the prefix rewrite (keeping the original path in
    /// `x-proxy-original-path`), appends route, virtual host and table headers
    /// in that order, then rewrites the authority.
    pub fn finalize_request_headers(
        &self,
        headers: &mut RequestHeaders,
        info: &RequestInfo,
    ) -> Result<(), RouteError> {
        if headers.is_finalized() {
            return Err(RouteError::AlreadyFinalized);
        }

        // Fallible work first so a failure leaves the headers untouched.
        let rewrite = match self.rule.prefix_rewrite() {
            Some(rewrite) => {
                let original = HeaderValue::from_str(headers.path())?;
                let new_path = self.rule.path_matcher().rewrite(headers.path(), rewrite);
                Some((original, new_path))
            }
            None => None,
        };

        if let Some((original, new_path)) = rewrite {
            headers.headers_mut().insert(ORIGINAL_PATH, original);
            headers.set_path(new_path);
        }

        let additions = self
            .rule
            .request_headers_to_add()
            .iter()
            .chain(self.virtual_host.request_headers_to_add())
            .chain(self.virtual_host.table_request_headers());
        for (name, value) in additions {
            headers.headers_mut().append(name.clone(), value.clone());
        }

        if let Some(host) = self.rule.host_rewrite() {
            headers.set_authority(host);
        } else if self.rule.auto_host_rewrite() {
            if let Some(host) = info.upstream_host() {
                headers.set_authority(host);
            }
        }

        headers.mark_finalized();
        Ok(())
    }
}
