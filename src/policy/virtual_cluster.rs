//! Virtual clusters: stat and priority groupings orthogonal to routes.

use std::str::FromStr;

use axum::http::Method;

use crate::config::loader::ConfigError;
use crate::config::schema::VirtualClusterConfig;
use crate::policy::Priority;
use crate::routing::headers::RequestHeaders;
use crate::routing::matcher::PathMatcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualCluster {
    name: String,
    path: PathMatcher,
    method: Option<Method>,
    priority: Priority,
}

impl VirtualCluster {
    pub fn new(name: impl Into<String>, path: PathMatcher, method: Option<Method>) -> Self {
        Self {
            name: name.into(),
            path,
            method,
            priority: Priority::Default,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn from_config(config: &VirtualClusterConfig) -> Result<Self, ConfigError> {
        let method = match &config.method {
            Some(m) => Some(
                Method::from_str(&m.to_uppercase()).map_err(|_| ConfigError::Method(m.clone()))?,
            ),
            None => None,
        };
        let path = PathMatcher::from_parts(config.prefix.as_deref(), config.path.as_deref(), true);
        Ok(Self::new(config.name.clone(), path, method).with_priority(config.priority))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn matches(&self, headers: &RequestHeaders) -> bool {
        if let Some(method) = &self.method {
            if method != headers.method() {
                return false;
            }
        }
        self.path.matches_path(headers.path())
    }
}
