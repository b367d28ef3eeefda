//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Candidate backend deployments, in registry order
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    /// Liveness probing settings
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Backend selection settings
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,

    /// Smart keep-alive settings
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,

    /// Outbound request retry policy
    #[serde(default)]
    pub requests: RequestConfig,

    /// Translation provider failover (optional)
    #[serde(default)]
    pub translation: Option<TranslationConfig>,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Admin/relay API listener
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
            api: ApiConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Admin and relay API listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Whether the API listener is started
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind
    #[serde(default = "default_api_address")]
    pub address: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_api_address(),
        }
    }
}

/// One backend deployment.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://lingualink-eu.example.com`
    pub url: String,

    /// Identity label (deployment account / region)
    pub label: String,
}

/// Liveness probing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// How often every backend is probed
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Per-probe timeout
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Consecutive failures at which a backend stops being eligible
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Primary liveness endpoint
    #[serde(default = "default_primary_path")]
    pub primary_path: String,

    /// Simpler liveness endpoint tried when the primary fails
    #[serde(default = "default_fallback_path")]
    pub fallback_path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            timeout: default_health_timeout(),
            max_consecutive_failures: default_max_consecutive_failures(),
            primary_path: default_primary_path(),
            fallback_path: default_fallback_path(),
        }
    }
}

/// Backend selection configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoadBalancerConfig {
    /// Selection strategy
    #[serde(default)]
    pub strategy: Strategy,
}

/// Backend selection strategy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    LeastResponseTime,
    LeastConnections,
    WeightedRoundRobin,
    #[default]
    HealthBased,
}

impl Strategy {
    /// All strategies, in the order they are listed to operators.
    pub const ALL: [Strategy; 5] = [
        Strategy::RoundRobin,
        Strategy::LeastResponseTime,
        Strategy::LeastConnections,
        Strategy::WeightedRoundRobin,
        Strategy::HealthBased,
    ];

    /// Wire name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round_robin",
            Strategy::LeastResponseTime => "least_response_time",
            Strategy::LeastConnections => "least_connections",
            Strategy::WeightedRoundRobin => "weighted_round_robin",
            Strategy::HealthBased => "health_based",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("unknown strategy '{}'", s))
    }
}

/// Keep-alive scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeepAliveConfig {
    /// Whether the scheduler runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Resource profile controlling active set size and tick rate
    #[serde(default)]
    pub resource_level: ResourceLevel,

    /// Rotate the active set on every Nth tick
    #[serde(default = "default_rotation_every")]
    pub rotation_every: u32,

    /// Override the level's active set size
    #[serde(default)]
    pub max_active_backends: Option<usize>,

    /// Override the level's tick interval
    #[serde(default, with = "option_humantime_serde")]
    pub tick_interval: Option<Duration>,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resource_level: ResourceLevel::default(),
            rotation_every: default_rotation_every(),
            max_active_backends: None,
            tick_interval: None,
        }
    }
}

/// Resource usage profile for the keep-alive scheduler.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLevel {
    Low,
    #[default]
    Normal,
    High,
}

impl ResourceLevel {
    /// Nominal active set size for this level.
    pub fn max_active_backends(&self) -> usize {
        match self {
            ResourceLevel::Low => 1,
            ResourceLevel::Normal => 2,
            ResourceLevel::High => 3,
        }
    }

    /// Tick interval for this level.
    pub fn tick_interval(&self) -> Duration {
        match self {
            ResourceLevel::Low => Duration::from_secs(12 * 60),
            ResourceLevel::Normal => Duration::from_secs(8 * 60),
            ResourceLevel::High => Duration::from_secs(4 * 60),
        }
    }
}

impl FromStr for ResourceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(ResourceLevel::Low),
            "normal" => Ok(ResourceLevel::Normal),
            "high" => Ok(ResourceLevel::High),
            other => Err(format!("unknown resource level '{}'", other)),
        }
    }
}

/// Outbound request retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestConfig {
    /// Total attempts per `execute` call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-attempt timeout
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// First backoff delay, doubled per attempt
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Backoff ceiling
    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub backoff_max: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout: default_request_timeout(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
        }
    }
}

/// Translation provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslationConfig {
    /// Provider REST base URL
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// Provider model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Total provider calls per logical translation
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between same-account retries
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Per-call timeout
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Hard input length ceiling, in characters
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// Accounts used round-robin
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            model: default_model(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            timeout: default_request_timeout(),
            max_text_length: default_max_text_length(),
            credentials: Vec::new(),
        }
    }
}

/// One provider account.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialConfig {
    pub account_id: String,
    pub api_key: String,
    #[serde(default)]
    pub label: String,
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("account_id", &self.account_id)
            .field("api_key", &"<redacted>")
            .field("label", &self.label)
            .finish()
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9190))
}

fn default_health_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_primary_path() -> String {
    "/health-check-primary".to_string()
}

fn default_fallback_path() -> String {
    "/ping-fallback".to_string()
}

fn default_rotation_every() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(5)
}

fn default_provider_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_model() -> String {
    "@cf/meta/m2m100-1.2b".to_string()
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_text_length() -> usize {
    8000
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Custom serde module for optional humantime durations.
mod option_humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => {
                let s = humantime::format_duration(*d).to_string();
                serializer.serialize_some(&s)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let hc = HealthCheckConfig::default();
        assert_eq!(hc.interval, Duration::from_secs(300));
        assert_eq!(hc.timeout, Duration::from_secs(5));
        assert_eq!(hc.max_consecutive_failures, 3);

        let req = RequestConfig::default();
        assert_eq!(req.max_retries, 3);
        assert_eq!(req.timeout, Duration::from_secs(8));

        assert_eq!(LoadBalancerConfig::default().strategy, Strategy::HealthBased);
        assert_eq!(KeepAliveConfig::default().rotation_every, 3);
        assert_eq!(TranslationConfig::default().max_text_length, 8000);
    }

    #[test]
    fn test_strategy_serde() {
        let s: Strategy = serde_yaml::from_str("round_robin").unwrap();
        assert_eq!(s, Strategy::RoundRobin);

        let s: Strategy = serde_yaml::from_str("weighted_round_robin").unwrap();
        assert_eq!(s, Strategy::WeightedRoundRobin);
    }

    #[test]
    fn test_strategy_from_str() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
        assert!("fastest".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_resource_levels() {
        assert_eq!(ResourceLevel::Low.max_active_backends(), 1);
        assert_eq!(ResourceLevel::Normal.max_active_backends(), 2);
        assert_eq!(ResourceLevel::High.tick_interval(), Duration::from_secs(240));
        assert_eq!("high".parse::<ResourceLevel>().unwrap(), ResourceLevel::High);
    }

    #[test]
    fn test_credential_debug_redacts_key() {
        let cred = CredentialConfig {
            account_id: "acct".to_string(),
            api_key: "secret-token".to_string(),
            label: "primary".to_string(),
        };
        let rendered = format!("{:?}", cred);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("acct"));
    }
}
