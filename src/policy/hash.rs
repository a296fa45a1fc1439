//! Route hash policy: how a request is hashed onto an upstream host.

use axum::http::HeaderName;
use xxhash_rust::xxh64::xxh64;

use crate::config::loader::ConfigError;
use crate::config::schema::HashPolicyConfig;
use crate::routing::headers::{header_name, RequestHeaders};

/// Hashes the value of one request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashPolicy {
    header: HeaderName,
}

impl HashPolicy {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    pub fn from_config(config: &HashPolicyConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(header_name(&config.header_name)?))
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header
    }

    /// Stable hash of the header value, or `None` if the header is absent or empty.
    pub fn generate_hash(&self, headers: &RequestHeaders) -> Option<u64> {
        headers
            .headers()
            .get(&self.header)
            .map(|v| v.as_bytes())
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| xxh64(bytes, 0))
    }
}
