//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and table construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("invalid header `{0}`")]
    Header(String),

    #[error("unknown retry trigger `{0}`")]
    RetryOn(String),

    #[error("invalid method `{0}`")]
    Method(String),

    #[error("route has no cluster, cluster header, weighted clusters or redirect")]
    MissingAction,
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[virtual_hosts]]
            name = "svc"
            domains = ["api.example.com"]

            [[virtual_hosts.routes]]
            prefix = "/"
            cluster = "backend"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.virtual_hosts.len(), 1);
        assert_eq!(config.virtual_hosts[0].routes[0].cluster.as_deref(), Some("backend"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_validation_errors_are_reported() {
        let err = parse_config(
            r#"
            [[virtual_hosts]]
            name = "svc"
            domains = []
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors, vec![ValidationError::NoDomains("svc".into())]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
