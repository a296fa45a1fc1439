//! Route tables and their published snapshot.
//!
//! # Responsibilities
//! - Compile a validated config into an immutable table
//! - Select the virtual host for an authority
//! - Resolve a request to a redirect, an entry, or nothing
//! - Publish new tables atomically while requests are in flight
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) exact host lookup via HashMap, wildcards scanned longest suffix first
//! - Explicit `None` rather than a silent default route

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::{HeaderName, HeaderValue};

use crate::config::loader::ConfigError;
use crate::config::schema::RouterConfig;
use crate::config::validation::validate_config;
use crate::observability::metrics;
use crate::routing::headers::{header_name, header_pairs, RequestHeaders};
use crate::routing::matcher::DomainPattern;
use crate::routing::route::Route;
use crate::routing::virtual_host::VirtualHost;
use crate::runtime::{InMemoryRuntime, Runtime};

/// Immutable snapshot of the routing configuration.
#[derive(Debug)]
pub struct RouteTable {
    virtual_hosts: Vec<Arc<VirtualHost>>,
    exact_domains: HashMap<String, usize>,
    /// Suffix patterns, longest first.
    wildcard_domains: Vec<(DomainPattern, usize)>,
    default_host: Option<usize>,
    internal_only_headers: Vec<HeaderName>,
    response_headers_to_add: Vec<(HeaderName, HeaderValue)>,
    response_headers_to_remove: Vec<HeaderName>,
    uses_runtime: bool,
    runtime: Arc<dyn Runtime>,
}

impl RouteTable {
    /// A table that routes nothing.
    pub fn empty() -> Self {
        Self {
            virtual_hosts: Vec::new(),
            exact_domains: HashMap::new(),
            wildcard_domains: Vec::new(),
            default_host: None,
            internal_only_headers: Vec::new(),
            response_headers_to_add: Vec::new(),
            response_headers_to_remove: Vec::new(),
            uses_runtime: false,
            runtime: Arc::new(InMemoryRuntime::new()),
        }
    }

    /// Validate and compile `config`.
    pub fn from_config(config: &RouterConfig, runtime: Arc<dyn Runtime>) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let table_headers = Arc::new(header_pairs(&config.request_headers_to_add)?);

        let mut virtual_hosts = Vec::with_capacity(config.virtual_hosts.len());
        let mut exact_domains = HashMap::new();
        let mut wildcard_domains = Vec::new();
        let mut default_host = None;

        for (idx, vhost_config) in config.virtual_hosts.iter().enumerate() {
            let vhost = VirtualHost::from_config(vhost_config, &runtime, table_headers.clone())?;
            for domain in vhost.domains() {
                match DomainPattern::parse(domain) {
                    DomainPattern::Any => default_host = Some(idx),
                    DomainPattern::Exact(domain) => {
                        exact_domains.insert(domain, idx);
                    }
                    suffix @ DomainPattern::Suffix(_) => wildcard_domains.push((suffix, idx)),
                }
            }
            virtual_hosts.push(Arc::new(vhost));
        }

        // Stable sort keeps declaration order among equal lengths.
        wildcard_domains.sort_by_key(|(pattern, _)| match pattern {
            DomainPattern::Suffix(suffix) => std::cmp::Reverse(suffix.len()),
            _ => std::cmp::Reverse(0),
        });

        let uses_runtime = virtual_hosts.iter().any(|v| v.uses_runtime());

        let table = Self {
            virtual_hosts,
            exact_domains,
            wildcard_domains,
            default_host,
            internal_only_headers: config
                .internal_only_headers
                .iter()
                .map(|h| header_name(h))
                .collect::<Result<_, _>>()?,
            response_headers_to_add: header_pairs(&config.response_headers_to_add)?,
            response_headers_to_remove: config
                .response_headers_to_remove
                .iter()
                .map(|h| header_name(h))
                .collect::<Result<_, _>>()?,
            uses_runtime,
            runtime,
        };

        tracing::debug!(
            virtual_hosts = table.virtual_hosts.len(),
            uses_runtime = table.uses_runtime,
            "Route table compiled"
        );
        Ok(table)
    }

    /// Virtual host serving `authority`: exact, then longest wildcard, then `*`.
    pub fn virtual_host_for(&self, authority: &str) -> Option<&Arc<VirtualHost>> {
        let host = authority.to_lowercase();

        let idx = self
            .exact_domains
            .get(&host)
            .copied()
            .or_else(|| {
                self.wildcard_domains
                    .iter()
                    .find(|(pattern, _)| pattern.matches(&host))
                    .map(|(_, idx)| *idx)
            })
            .or(self.default_host)?;

        self.virtual_hosts.get(idx)
    }

    /// Resolve a request.
    ///
    /// `random_seed` drives runtime gates and weighted clusters; the same seed
    /// and headers always give the same answer for the same table.
    pub fn route(&self, headers: &RequestHeaders, random_seed: u64) -> Option<Arc<Route>> {
        let Some(vhost) = self.virtual_host_for(headers.authority()) else {
            metrics::record_resolution("no_host");
            tracing::debug!(authority = headers.authority(), "No virtual host for authority");
            return None;
        };

        let route = vhost.route(headers, random_seed);
        match &route {
            Some(Route::Entry(entry)) => {
                metrics::record_resolution("entry");
                tracing::debug!(
                    virtual_host = vhost.name(),
                    path = headers.path(),
                    cluster = entry.cluster_name(),
                    "Route matched"
                );
            }
            Some(Route::Redirect(_)) => {
                metrics::record_resolution("redirect");
                tracing::debug!(virtual_host = vhost.name(), path = headers.path(), "Redirect matched");
            }
            None => {
                metrics::record_resolution("no_route");
                tracing::debug!(virtual_host = vhost.name(), path = headers.path(), "No route matched");
            }
        }
        route.map(Arc::new)
    }

    pub fn virtual_hosts(&self) -> &[Arc<VirtualHost>] {
        &self.virtual_hosts
    }

    pub fn internal_only_headers(&self) -> &[HeaderName] {
        &self.internal_only_headers
    }

    pub fn response_headers_to_add(&self) -> &[(HeaderName, HeaderValue)] {
        &self.response_headers_to_add
    }

    pub fn response_headers_to_remove(&self) -> &[HeaderName] {
        &self.response_headers_to_remove
    }

    /// True if any route consults the runtime.
    pub fn uses_runtime(&self) -> bool {
        self.uses_runtime
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    /// Remove internal-only headers from a request that is not internal.
    pub fn strip_internal_only_headers(&self, headers: &mut RequestHeaders) {
        if headers.is_internal() {
            return;
        }
        for name in &self.internal_only_headers {
            headers.headers_mut().remove(name);
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::empty()
    }
}

/// The currently published route table.
///
/// Readers take an `Arc` snapshot per request and keep it for the request's
/// lifetime; a publish never affects requests already in flight.
#[derive(Debug)]
pub struct RouteTableHandle {
    current: ArcSwap<RouteTable>,
}

impl RouteTableHandle {
    pub fn new(table: RouteTable) -> Self {
        Self {
            current: ArcSwap::from_pointee(table),
        }
    }

    pub fn load(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    pub fn publish(&self, table: RouteTable) {
        self.current.store(Arc::new(table));
        tracing::info!("Route table published");
    }

    /// Resolve against the current table.
    pub fn route(&self, headers: &RequestHeaders, random_seed: u64) -> Option<Arc<Route>> {
        self.current.load().route(headers, random_seed)
    }
}

impl Default for RouteTableHandle {
    fn default() -> Self {
        Self::new(RouteTable::empty())
    }
}
