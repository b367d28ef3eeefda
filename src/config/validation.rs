//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - At least one backend, each with an http(s) URL and a label
/// - No duplicate backend URLs
/// - Non-zero retry and failure thresholds
/// - At least one complete credential set when translation is configured
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push("at least one backend must be defined".to_string());
    }

    let mut urls = HashSet::new();
    for backend in &config.backends {
        let url = backend.url.trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!(
                "backend url '{}' must start with http:// or https://",
                backend.url
            ));
        }
        if !urls.insert(url) {
            errors.push(format!("duplicate backend url: {}", backend.url));
        }
        if backend.label.trim().is_empty() {
            errors.push(format!("backend '{}' has an empty label", backend.url));
        }
    }

    if config.health_check.max_consecutive_failures == 0 {
        errors.push("health_check.max_consecutive_failures must be >= 1".to_string());
    }

    if config.requests.max_retries == 0 {
        errors.push("requests.max_retries must be >= 1".to_string());
    }

    if config.keep_alive.rotation_every == 0 {
        errors.push("keep_alive.rotation_every must be >= 1".to_string());
    }

    if config.keep_alive.max_active_backends == Some(0) {
        errors.push("keep_alive.max_active_backends must be >= 1".to_string());
    }

    if let Some(ref translation) = config.translation {
        if translation.credentials.is_empty() {
            errors.push("translation requires at least one credential set".to_string());
        }
        for (i, cred) in translation.credentials.iter().enumerate() {
            if cred.account_id.trim().is_empty() || cred.api_key.trim().is_empty() {
                errors.push(format!(
                    "translation credential #{} needs both account_id and api_key",
                    i + 1
                ));
            }
        }
        if translation.max_retries == 0 {
            errors.push("translation.max_retries must be >= 1".to_string());
        }
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn minimal_config() -> Config {
        Config {
            global: GlobalConfig::default(),
            backends: vec![
                BackendConfig {
                    url: "https://eu.lingualink.test".to_string(),
                    label: "eu".to_string(),
                },
                BackendConfig {
                    url: "https://us.lingualink.test".to_string(),
                    label: "us".to_string(),
                },
            ],
            health_check: HealthCheckConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
            keep_alive: KeepAliveConfig::default(),
            requests: RequestConfig::default(),
            translation: None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&minimal_config()).is_ok());
    }

    #[test]
    fn test_no_backends() {
        let mut config = minimal_config();
        config.backends.clear();
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("at least one backend"));
    }

    #[test]
    fn test_bad_scheme() {
        let mut config = minimal_config();
        config.backends[0].url = "ftp://eu.lingualink.test".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("must start with http"));
    }

    #[test]
    fn test_duplicate_url_ignores_trailing_slash() {
        let mut config = minimal_config();
        config.backends[1].url = "https://eu.lingualink.test/".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("duplicate backend url"));
    }

    #[test]
    fn test_translation_without_credentials() {
        let mut config = minimal_config();
        config.translation = Some(TranslationConfig::default());
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("at least one credential set"));
    }

    #[test]
    fn test_translation_incomplete_credential() {
        let mut config = minimal_config();
        config.translation = Some(TranslationConfig {
            credentials: vec![CredentialConfig {
                account_id: "acct".to_string(),
                api_key: " ".to_string(),
                label: String::new(),
            }],
            ..TranslationConfig::default()
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("credential #1"));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = minimal_config();
        config.requests.max_retries = 0;
        config.global.log_level = "loud".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("max_retries"));
        assert!(err.contains("invalid log level"));
    }
}
