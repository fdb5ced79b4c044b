use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{Result, ShepherdError};
use crate::models::ProxyProtocol;
use crate::rotation::RotationStrategy;

/// Application configuration loaded from a JSON file.
///
/// `${VAR}` references in the raw file are interpolated from the
/// environment in an explicit pre-processing pass before parsing, so
/// secrets (API keys in source headers) stay out of the file itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pool state and thresholds
    pub pool: PoolConfig,
    /// Candidate validation
    pub validator: ValidatorConfig,
    /// Read-side rotation
    pub rotation: RotationConfig,
    /// Candidate sources
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Snapshot file path (default: pool_status.json)
    pub snapshot_path: PathBuf,
    /// Consecutive failures before a valid record is demoted (default: 3)
    pub max_fails: u32,
    /// Unsuccessful recover() passes before a failed record is banned (default: 3)
    pub max_recovery_attempts: u32,
    /// Age in seconds after which clean() drops failed records (default: 86400)
    pub failed_retention_secs: u64,
    /// Valid count below which the persisted status reports degraded (default: 1)
    pub min_healthy: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("pool_status.json"),
            max_fails: 3,
            max_recovery_attempts: 3,
            failed_retention_secs: 86_400,
            min_healthy: 1,
        }
    }
}

impl PoolConfig {
    pub fn failed_retention(&self) -> Duration {
        Duration::from_secs(self.failed_retention_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Probe URLs tried in order per candidate
    pub probe_urls: Vec<String>,
    /// Bounded worker pool size (default: 16)
    pub concurrency: usize,
    /// Per-attempt timeout in seconds (default: 5)
    pub attempt_timeout_secs: u64,
    /// Attempts per probe URL (default: 2)
    pub retry_count: u32,
    /// Exponential backoff base in milliseconds (default: 250)
    pub backoff_base_ms: u64,
    /// Exponential backoff factor (default: 2.0)
    pub backoff_factor: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            probe_urls: vec!["http://www.google.com/generate_204".to_string()],
            concurrency: 16,
            attempt_timeout_secs: 5,
            retry_count: 2,
            backoff_base_ms: 250,
            backoff_factor: 2.0,
        }
    }
}

impl ValidatorConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Selection strategy: round_robin or weighted (default: round_robin)
    pub strategy: String,
    /// Minimum seconds since last use before re-selection (default: 0)
    pub cooldown_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            strategy: "round_robin".to_string(),
            cooldown_secs: 0,
        }
    }
}

impl RotationConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// A configured candidate source: a local file or a provider HTTP API
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    File(FileSourceConfig),
    Api(ApiSourceConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSourceConfig {
    /// Path to a newline list or JSON array of host:port entries
    pub path: PathBuf,
    /// Protocol assigned to every entry (default: http)
    #[serde(default)]
    pub protocol: ProxyProtocol,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSourceConfig {
    /// Provider endpoint, queried with GET
    pub url: String,
    /// Extra request headers (e.g. Authorization)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Extra query parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Dotted path to the item list inside the response; defaults to the
    /// root array or a conventional wrapper key (data/list/items/proxies)
    #[serde(default)]
    pub items_field: Option<String>,
    /// Dotted path to the host/IP within each item (default: ip)
    #[serde(default = "default_ip_field")]
    pub ip_field: String,
    /// Dotted path to the port within each item (default: port)
    #[serde(default = "default_port_field")]
    pub port_field: String,
    /// Optional dotted path to a username within each item
    #[serde(default)]
    pub username_field: Option<String>,
    /// Optional dotted path to a password within each item
    #[serde(default)]
    pub password_field: Option<String>,
    /// Protocol assigned to every entry (default: http)
    #[serde(default)]
    pub protocol: ProxyProtocol,
}

fn default_ip_field() -> String {
    "ip".to_string()
}

fn default_port_field() -> String {
    "port".to_string()
}

impl SourceConfig {
    /// Stable source identity, recorded on every record it produces
    pub fn id(&self) -> String {
        match self {
            SourceConfig::File(f) => format!("file:{}", f.path.display()),
            SourceConfig::Api(a) => format!("api:{}", a.url),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            validator: ValidatorConfig::default(),
            rotation: RotationConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ShepherdError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&raw)
    }

    /// Parse configuration from raw JSON text
    pub fn parse(raw: &str) -> Result<Self> {
        let interpolated = interpolate_env(raw)?;
        let config: Config = serde_json::from_str(&interpolated)
            .map_err(|e| ShepherdError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(ShepherdError::NoSources);
        }
        if self.validator.probe_urls.is_empty() {
            return Err(ShepherdError::InvalidConfig(
                "validator.probe_urls must not be empty".into(),
            ));
        }
        for probe_url in &self.validator.probe_urls {
            Url::parse(probe_url).map_err(|e| {
                ShepherdError::InvalidConfig(format!("invalid probe URL {}: {}", probe_url, e))
            })?;
        }
        if self.validator.concurrency == 0 {
            return Err(ShepherdError::InvalidConfig(
                "validator.concurrency must be at least 1".into(),
            ));
        }
        if self.validator.retry_count == 0 {
            return Err(ShepherdError::InvalidConfig(
                "validator.retry_count must be at least 1".into(),
            ));
        }
        if RotationStrategy::from_str(&self.rotation.strategy).is_none() {
            return Err(ShepherdError::InvalidConfig(format!(
                "unknown rotation strategy: {}",
                self.rotation.strategy
            )));
        }
        for source in &self.sources {
            if let SourceConfig::Api(api) = source {
                Url::parse(&api.url).map_err(|e| {
                    ShepherdError::InvalidConfig(format!("invalid source URL {}: {}", api.url, e))
                })?;
            }
        }
        Ok(())
    }
}

/// Replace `${VAR}` references with environment values.
///
/// An unset variable is a configuration error, not an empty string;
/// silently empty credentials are worse than failing fast.
fn interpolate_env(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            ShepherdError::InvalidConfig("unterminated ${ reference in config".into())
        })?;
        let name = &after[..end];
        let value = env::var(name).map_err(|_| {
            ShepherdError::InvalidConfig(format!("environment variable {} is not set", name))
        })?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn minimal_config_json() -> &'static str {
        r#"{"sources": [{"type": "file", "path": "proxies.txt"}]}"#
    }

    #[test]
    fn test_defaults_from_minimal_config() {
        let config = Config::parse(minimal_config_json()).unwrap();

        assert_eq!(config.pool.snapshot_path, PathBuf::from("pool_status.json"));
        assert_eq!(config.pool.max_fails, 3);
        assert_eq!(config.pool.max_recovery_attempts, 3);
        assert_eq!(config.pool.failed_retention_secs, 86_400);
        assert_eq!(config.pool.min_healthy, 1);

        assert_eq!(config.validator.concurrency, 16);
        assert_eq!(config.validator.attempt_timeout(), Duration::from_secs(5));
        assert_eq!(config.validator.retry_count, 2);

        assert_eq!(config.rotation.strategy, "round_robin");
        assert_eq!(config.rotation.cooldown(), Duration::ZERO);

        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].id(), "file:proxies.txt");
    }

    #[test]
    fn test_tagged_source_parsing() {
        let config = Config::parse(
            r#"{
                "sources": [
                    {"type": "file", "path": "lists/static.txt", "protocol": "socks5"},
                    {
                        "type": "api",
                        "url": "https://provider.example/v1/proxies",
                        "headers": {"Authorization": "Bearer token"},
                        "params": {"country": "us"},
                        "ip_field": "data.host",
                        "port_field": "data.port",
                        "username_field": "auth.user",
                        "password_field": "auth.pass"
                    }
                ]
            }"#,
        )
        .unwrap();

        match &config.sources[0] {
            SourceConfig::File(f) => {
                assert_eq!(f.protocol, ProxyProtocol::Socks5);
            }
            other => panic!("expected file source, got {:?}", other),
        }
        match &config.sources[1] {
            SourceConfig::Api(a) => {
                assert_eq!(a.ip_field, "data.host");
                assert_eq!(a.username_field.as_deref(), Some("auth.user"));
                assert_eq!(a.headers.get("Authorization").unwrap(), "Bearer token");
                assert_eq!(a.protocol, ProxyProtocol::Http);
            }
            other => panic!("expected api source, got {:?}", other),
        }
    }

    #[test]
    fn test_no_sources_is_fatal() {
        let err = Config::parse("{}").unwrap_err();
        assert!(matches!(err, ShepherdError::NoSources));
    }

    #[test]
    fn test_invalid_probe_url_rejected() {
        let err = Config::parse(
            r#"{
                "validator": {"probe_urls": ["not a url"]},
                "sources": [{"type": "file", "path": "proxies.txt"}]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ShepherdError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = Config::parse(
            r#"{
                "rotation": {"strategy": "fastest"},
                "sources": [{"type": "file", "path": "proxies.txt"}]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ShepherdError::InvalidConfig(_)));
    }

    #[test]
    fn test_env_interpolation() {
        let _lock = ENV_LOCK.lock().unwrap();
        env::set_var("SHEPHERD_TEST_TOKEN", "secret-token");

        let config = Config::parse(
            r#"{
                "sources": [{
                    "type": "api",
                    "url": "https://provider.example/v1/proxies",
                    "headers": {"Authorization": "Bearer ${SHEPHERD_TEST_TOKEN}"}
                }]
            }"#,
        )
        .unwrap();

        env::remove_var("SHEPHERD_TEST_TOKEN");

        match &config.sources[0] {
            SourceConfig::Api(a) => {
                assert_eq!(
                    a.headers.get("Authorization").unwrap(),
                    "Bearer secret-token"
                );
            }
            other => panic!("expected api source, got {:?}", other),
        }
    }

    #[test]
    fn test_env_interpolation_unset_var_fails() {
        let _lock = ENV_LOCK.lock().unwrap();
        env::remove_var("SHEPHERD_TEST_UNSET");

        let err = interpolate_env("${SHEPHERD_TEST_UNSET}").unwrap_err();
        assert!(matches!(err, ShepherdError::InvalidConfig(_)));
    }

    #[test]
    fn test_env_interpolation_unterminated() {
        let err = interpolate_env("prefix ${OOPS").unwrap_err();
        assert!(matches!(err, ShepherdError::InvalidConfig(_)));
    }
}
