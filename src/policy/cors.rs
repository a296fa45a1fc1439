//! CORS policy carried by routes and virtual hosts.
//!
//! Header emission belongs to the transport; this is only the data.

use crate::config::schema::CorsConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorsPolicy {
    allow_origins: Vec<String>,
    allow_methods: String,
    allow_headers: String,
    expose_headers: String,
    max_age: String,
    allow_credentials: Option<bool>,
    enabled: bool,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Self {
        Self {
            allow_origins: config.allow_origin.clone(),
            allow_methods: config.allow_methods.clone(),
            allow_headers: config.allow_headers.clone(),
            expose_headers: config.expose_headers.clone(),
            max_age: config.max_age.clone(),
            allow_credentials: config.allow_credentials,
            enabled: config.enabled,
        }
    }

    pub fn allow_origins(&self) -> &[String] {
        &self.allow_origins
    }

    pub fn allow_methods(&self) -> &str {
        &self.allow_methods
    }

    pub fn allow_headers(&self) -> &str {
        &self.allow_headers
    }

    pub fn expose_headers(&self) -> &str {
        &self.expose_headers
    }

    pub fn max_age(&self) -> &str {
        &self.max_age
    }

    pub fn allow_credentials(&self) -> Option<bool> {
        self.allow_credentials
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}
