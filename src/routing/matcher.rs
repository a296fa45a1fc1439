//! Route matching logic.
//!
//! # Responsibilities
//! - Match the authority against virtual host domains (exact, wildcard suffix, any)
//! - Match path prefix or exact path (case-sensitive unless configured otherwise)
//! - Match header presence or exact value
//! - Gate routes on a runtime percentage driven by the request's random seed
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Domain matching is case-insensitive
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use std::sync::Arc;

use axum::http::HeaderName;

use crate::routing::headers::RequestHeaders;
use crate::runtime::Runtime;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, headers: &RequestHeaders, random_seed: u64) -> bool;
}

/// A virtual host domain pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    /// `api.example.com`
    Exact(String),
    /// `*.example.com` or `*-api.example.com`; holds the part after `*`.
    Suffix(String),
    /// `*`
    Any,
}

impl DomainPattern {
    /// Parse a configured domain. Patterns are normalized to lowercase.
    pub fn parse(domain: &str) -> Self {
        let domain = domain.to_lowercase();
        if domain == "*" {
            DomainPattern::Any
        } else if let Some(suffix) = domain.strip_prefix('*') {
            DomainPattern::Suffix(suffix.to_string())
        } else {
            DomainPattern::Exact(domain)
        }
    }

    /// `host` must already be lowercase.
    pub fn matches(&self, host: &str) -> bool {
        match self {
            DomainPattern::Exact(domain) => host == domain,
            // The wildcard must stand for at least one character.
            DomainPattern::Suffix(suffix) => host.len() > suffix.len() && host.ends_with(suffix),
            DomainPattern::Any => true,
        }
    }
}

/// Matches the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatcher {
    Any,
    /// Prefix of the full path, query string included.
    Prefix { prefix: String, case_sensitive: bool },
    /// Whole path, query string ignored.
    Exact { path: String, case_sensitive: bool },
}

impl PathMatcher {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        PathMatcher::Prefix {
            prefix: prefix.into(),
            case_sensitive: true,
        }
    }

    pub fn exact(path: impl Into<String>) -> Self {
        PathMatcher::Exact {
            path: path.into(),
            case_sensitive: true,
        }
    }

    pub fn from_parts(prefix: Option<&str>, path: Option<&str>, case_sensitive: bool) -> Self {
        match (prefix, path) {
            (_, Some(path)) => PathMatcher::Exact {
                path: path.to_string(),
                case_sensitive,
            },
            (Some(prefix), None) => PathMatcher::Prefix {
                prefix: prefix.to_string(),
                case_sensitive,
            },
            (None, None) => PathMatcher::Any,
        }
    }

    pub fn matches_path(&self, path: &str) -> bool {
        match self {
            PathMatcher::Any => true,
            PathMatcher::Prefix {
                prefix,
                case_sensitive,
            } => match path.get(..prefix.len()) {
                Some(head) => text_eq(head, prefix, *case_sensitive),
                None => false,
            },
            PathMatcher::Exact {
                path: expected,
                case_sensitive,
            } => {
                let path = path.split('?').next().unwrap_or(path);
                text_eq(path, expected, *case_sensitive)
            }
        }
    }

    /// Replace the matched portion of `path` with `rewrite`.
    ///
    /// Only meaningful for a path this matcher accepted.
    pub fn rewrite(&self, path: &str, rewrite: &str) -> String {
        match self {
            PathMatcher::Any => format!("{rewrite}{path}"),
            PathMatcher::Prefix { prefix, .. } => {
                format!("{rewrite}{}", path.get(prefix.len()..).unwrap_or(""))
            }
            PathMatcher::Exact { .. } => match path.find('?') {
                Some(idx) => format!("{rewrite}{}", &path[idx..]),
                None => rewrite.to_string(),
            },
        }
    }
}

fn text_eq(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, headers: &RequestHeaders, _random_seed: u64) -> bool {
        self.matches_path(headers.path())
    }
}

/// Matches a header's presence, or its exact value.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: HeaderName,
    value: Option<String>,
}

impl HeaderMatcher {
    pub fn new(name: HeaderName, value: Option<String>) -> Self {
        Self { name, value }
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, headers: &RequestHeaders, _random_seed: u64) -> bool {
        match &self.value {
            None => headers.headers().contains_key(&self.name),
            Some(expected) => headers
                .headers()
                .get_all(&self.name)
                .iter()
                .any(|v| v.to_str().map(|v| v == expected).unwrap_or(false)),
        }
    }
}

/// Enables a route for a runtime-controlled share of requests.
#[derive(Debug, Clone)]
pub struct RuntimeMatcher {
    key: String,
    default: u64,
    runtime: Arc<dyn Runtime>,
}

impl RuntimeMatcher {
    pub fn new(key: impl Into<String>, default: u64, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            key: key.into(),
            default,
            runtime,
        }
    }
}

impl Matcher for RuntimeMatcher {
    fn matches(&self, _headers: &RequestHeaders, random_seed: u64) -> bool {
        self.runtime
            .feature_enabled(&self.key, self.default, random_seed)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn push(&mut self, matcher: Box<dyn Matcher>) {
        self.matchers.push(matcher);
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, headers: &RequestHeaders, random_seed: u64) -> bool {
        // Short-circuits on the first failing condition
        self.matchers.iter().all(|m| m.matches(headers, random_seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::InMemoryRuntime;
    use axum::http::HeaderValue;

    #[test]
    fn test_domain_pattern() {
        let exact = DomainPattern::parse("Example.com");
        assert_eq!(exact, DomainPattern::Exact("example.com".into()));
        assert!(exact.matches("example.com"));
        assert!(!exact.matches("www.example.com"));

        let wildcard = DomainPattern::parse("*.example.com");
        assert!(wildcard.matches("www.example.com"));
        assert!(wildcard.matches("a.b.example.com"));
        assert!(!wildcard.matches(".example.com"));
        assert!(!wildcard.matches("example.com"));

        let dash = DomainPattern::parse("*-api.example.com");
        assert!(dash.matches("eu-api.example.com"));

        assert_eq!(DomainPattern::parse("*"), DomainPattern::Any);
        assert!(DomainPattern::Any.matches("anything"));
    }

    #[test]
    fn test_path_matcher() {
        let matcher = PathMatcher::prefix("/api");
        assert!(matcher.matches_path("/api/v1"));
        assert!(matcher.matches_path("/apikeys"));
        assert!(!matcher.matches_path("/images"));
        assert!(!matcher.matches_path("/API/v1"));
        assert!(!matcher.matches_path("/a"));

        let insensitive = PathMatcher::from_parts(Some("/api"), None, false);
        assert!(insensitive.matches_path("/API/v1"));

        let exact = PathMatcher::exact("/health");
        assert!(exact.matches_path("/health"));
        assert!(exact.matches_path("/health?verbose=1"));
        assert!(!exact.matches_path("/health/deep"));

        assert!(PathMatcher::Any.matches_path("/whatever"));
    }

    #[test]
    fn test_path_rewrite() {
        let prefix = PathMatcher::prefix("/api/");
        assert_eq!(prefix.rewrite("/api/users?x=1", "/v2/"), "/v2/users?x=1");

        let exact = PathMatcher::exact("/old");
        assert_eq!(exact.rewrite("/old?q=1", "/new"), "/new?q=1");
        assert_eq!(exact.rewrite("/old", "/new"), "/new");
    }

    #[test]
    fn test_header_matcher() {
        let presence = HeaderMatcher::new(HeaderName::from_static("x-canary"), None);
        let exact = HeaderMatcher::new(
            HeaderName::from_static("x-canary"),
            Some("yes".to_string()),
        );

        let with = RequestHeaders::get("svc", "/")
            .with_header("X-Canary", HeaderValue::from_static("no"))
            .with_header("x-canary", HeaderValue::from_static("yes"));
        let without = RequestHeaders::get("svc", "/");

        assert!(presence.matches(&with, 0));
        assert!(exact.matches(&with, 0));
        assert!(!presence.matches(&without, 0));
        assert!(!exact.matches(&without, 0));
    }

    #[test]
    fn test_and_matcher_with_runtime_gate() {
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.set("routes.beta", 50);

        let matcher = AndMatcher::new(vec![
            Box::new(PathMatcher::prefix("/beta")),
            Box::new(RuntimeMatcher::new("routes.beta", 0, runtime)),
        ]);

        let req = RequestHeaders::get("svc", "/beta/x");
        assert!(matcher.matches(&req, 10));
        assert!(!matcher.matches(&req, 60));
        assert!(matcher.matches(&req, 149));
        assert!(!matcher.matches(&RequestHeaders::get("svc", "/other"), 10));
        assert!(AndMatcher::default().matches(&req, 0));
    }
}
