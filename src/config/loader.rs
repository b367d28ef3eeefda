//! Configuration file loading.

use crate::config::{validate_config, Config};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a YAML file.
///
/// Reads, parses and validates. A configuration without backends (or with
/// translation enabled but no credential sets) is rejected here, so the
/// process refuses to start rather than run degraded.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse and validate configuration from a YAML string.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(contents)?;
    validate_config(&config).map_err(ConfigError::ValidationError)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResourceLevel, Strategy};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_minimal_config() {
        let yaml = r#"
backends:
  - url: "https://eu.lingualink.test"
    label: eu
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.load_balancer.strategy, Strategy::HealthBased);
        assert!(config.translation.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let yaml = r#"
global:
  log_level: debug
  log_format: pretty
  api:
    address: "127.0.0.1:9999"
backends:
  - url: "https://eu.lingualink.test"
    label: eu
  - url: "https://us.lingualink.test"
    label: us
health_check:
  interval: 1m
  timeout: 2s
load_balancer:
  strategy: least_connections
keep_alive:
  resource_level: high
  tick_interval: 30s
requests:
  max_retries: 5
  timeout: 3s
translation:
  retry_delay: 250ms
  credentials:
    - account_id: acct-1
      api_key: key-1
      label: first
"#;

        let config = parse_config(yaml).unwrap();
        assert_eq!(config.global.api.address.port(), 9999);
        assert_eq!(config.health_check.interval, Duration::from_secs(60));
        assert_eq!(config.load_balancer.strategy, Strategy::LeastConnections);
        assert_eq!(config.keep_alive.resource_level, ResourceLevel::High);
        assert_eq!(config.keep_alive.tick_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.requests.max_retries, 5);

        let translation = config.translation.unwrap();
        assert_eq!(translation.retry_delay, Duration::from_millis(250));
        assert_eq!(translation.credentials.len(), 1);
    }

    #[test]
    fn test_zero_backends_is_fatal() {
        let result = parse_config("backends: []\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/lingualink.yaml");
        assert!(matches!(result.unwrap_err(), ConfigError::ReadError(_)));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let result = parse_config("not: valid: yaml: {{{}}}");
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }
}
