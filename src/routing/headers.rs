//! Request and response header views used by routing and retries.
//!
//! # Design Decisions
//! - Header names are case-insensitive (backed by `HeaderMap`)
//! - Method, authority and path are first-class fields, not pseudo-headers
//! - The `Host` header is folded into the authority and never kept in the map
//! - Values that are not valid UTF-8 read as absent, never as an error

use axum::http::header::{AsHeaderName, IntoHeaderName};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::config::loader::ConfigError;
use crate::config::schema::HeaderValueConfig;

/// Original request path, recorded when a prefix rewrite applies.
pub const ORIGINAL_PATH: HeaderName = HeaderName::from_static("x-proxy-original-path");
/// Set to `true` by the transport for requests from internal sources.
pub const INTERNAL: HeaderName = HeaderName::from_static("x-proxy-internal");
/// Request override: extra retry triggers.
pub const RETRY_ON: HeaderName = HeaderName::from_static("x-proxy-retry-on");
/// Request override: extra gRPC retry triggers.
pub const RETRY_GRPC_ON: HeaderName = HeaderName::from_static("x-proxy-retry-grpc-on");
/// Request override: retry count.
pub const MAX_RETRIES: HeaderName = HeaderName::from_static("x-proxy-max-retries");
/// Response marker from an overloaded upstream proxy; such responses are never retried.
pub const OVERLOADED: HeaderName = HeaderName::from_static("x-proxy-overloaded");
pub const FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const GRPC_STATUS: HeaderName = HeaderName::from_static("grpc-status");

/// Headers of an inbound request as seen by the router.
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    method: Method,
    authority: String,
    path: String,
    headers: HeaderMap,
    finalized: bool,
}

impl RequestHeaders {
    pub fn new(method: Method, authority: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            authority: authority.into(),
            path: path.into(),
            headers: HeaderMap::new(),
            finalized: false,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(authority: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::GET, authority, path)
    }

    /// Append a header value.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Path including any query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_without_query(&self) -> &str {
        match self.path.find('?') {
            Some(idx) => &self.path[..idx],
            None => &self.path,
        }
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Scheme the client used, from `x-forwarded-proto`; `http` when absent.
    pub fn forwarded_proto(&self) -> &str {
        self.header(FORWARDED_PROTO).unwrap_or("http")
    }

    pub fn is_internal(&self) -> bool {
        self.header(INTERNAL) == Some("true")
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn set_authority(&mut self, authority: impl Into<String>) {
        self.authority = authority.into();
        self.headers.remove(header::HOST);
    }

    /// True once a route entry has rewritten these headers for forwarding.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.finalized = true;
    }
}

impl From<&Parts> for RequestHeaders {
    fn from(parts: &Parts) -> Self {
        let authority = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut headers = parts.headers.clone();
        headers.remove(header::HOST);

        Self {
            method: parts.method.clone(),
            authority,
            path,
            headers,
            finalized: false,
        }
    }
}

/// gRPC status codes carried in `grpc-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrpcStatus {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl GrpcStatus {
    pub fn from_code(code: u32) -> Option<Self> {
        use GrpcStatus::*;
        let status = match code {
            0 => Ok,
            1 => Cancelled,
            2 => Unknown,
            3 => InvalidArgument,
            4 => DeadlineExceeded,
            5 => NotFound,
            6 => AlreadyExists,
            7 => PermissionDenied,
            8 => ResourceExhausted,
            9 => FailedPrecondition,
            10 => Aborted,
            11 => OutOfRange,
            12 => Unimplemented,
            13 => Internal,
            14 => Unavailable,
            15 => DataLoss,
            16 => Unauthenticated,
            _ => return None,
        };
        Some(status)
    }
}

/// Status and headers (or trailers) of one upstream attempt.
#[derive(Debug, Clone)]
pub struct ResponseHeaders {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseHeaders {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Parsed `grpc-status`, if present and known.
    pub fn grpc_status(&self) -> Option<GrpcStatus> {
        self.headers
            .get(GRPC_STATUS)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok())
            .and_then(GrpcStatus::from_code)
    }

    pub fn is_overloaded(&self) -> bool {
        self.headers.contains_key(OVERLOADED)
    }
}

impl From<&axum::http::response::Parts> for ResponseHeaders {
    fn from(parts: &axum::http::response::Parts) -> Self {
        Self {
            status: parts.status,
            headers: parts.headers.clone(),
        }
    }
}

/// Facts about a request known only at forwarding time.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    upstream_host: Option<String>,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hostname of the upstream host picked by the load balancer.
    pub fn with_upstream_host(mut self, host: impl Into<String>) -> Self {
        self.upstream_host = Some(host.into());
        self
    }

    pub fn upstream_host(&self) -> Option<&str> {
        self.upstream_host.as_deref()
    }
}

pub(crate) fn header_name(name: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| ConfigError::Header(name.to_string()))
}

pub(crate) fn header_pairs(
    pairs: &[HeaderValueConfig],
) -> Result<Vec<(HeaderName, HeaderValue)>, ConfigError> {
    pairs
        .iter()
        .map(|pair| {
            let value = HeaderValue::from_str(&pair.value)
                .map_err(|_| ConfigError::Header(pair.key.clone()))?;
            Ok((header_name(&pair.key)?, value))
        })
        .collect()
}
