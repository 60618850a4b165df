//! Configuration management for prefect-exporter
//!
//! Handles loading and validating configuration from YAML files and
//! applying command-line overrides on top of it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cli::Cli;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing the configuration file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Prefect API configuration
    #[serde(default)]
    pub prefect: PrefectConfig,

    /// Resource collection settings
    #[serde(default)]
    pub collection: CollectionConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Prefect API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefectConfig {
    /// Prefect API base URL
    #[serde(default = "default_prefect_url")]
    pub url: String,

    /// Optional API key, sent as a bearer token
    pub api_key: Option<String>,

    /// Optional username for basic auth
    pub username: Option<String>,

    /// Optional password for basic auth
    pub password: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Total attempts per request before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between attempts in milliseconds
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Send CSRF token headers with every request
    #[serde(default)]
    pub csrf_enabled: bool,

    /// CSRF client identifier (random per process when unset)
    pub client_id: Option<String>,
}

/// Resource collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Lookback window for flow runs, in minutes
    #[serde(default = "default_offset_minutes")]
    pub offset_minutes: u64,

    /// Lookback window for failed flow runs, in minutes
    #[serde(default = "default_failed_runs_offset_minutes")]
    pub failed_runs_offset_minutes: u64,

    /// Failed runs kept per deployment/flow pair
    #[serde(default = "default_failed_runs_limit")]
    pub failed_runs_limit: usize,

    /// Follow pages until an empty one is returned
    #[serde(default = "default_true")]
    pub pagination_enabled: bool,

    /// Page size
    #[serde(default = "default_pagination_limit")]
    pub pagination_limit: usize,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// What to do when a scrape cycle fails
    #[serde(default)]
    pub on_cycle_error: CycleErrorPolicy,
}

/// Policy applied when a collection cycle fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleErrorPolicy {
    /// Shut the exporter down; stale metrics are worse than none
    #[default]
    Exit,
    /// Keep serving the last complete snapshot
    ServeLast,
}

// Default value functions
fn default_prefect_url() -> String {
    "http://localhost:4200/api".to_string()
}

fn default_timeout() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_offset_minutes() -> u64 {
    5
}

fn default_failed_runs_offset_minutes() -> u64 {
    60
}

fn default_failed_runs_limit() -> usize {
    3
}

fn default_pagination_limit() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    8000
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for PrefectConfig {
    fn default() -> Self {
        Self {
            url: default_prefect_url(),
            api_key: None,
            username: None,
            password: None,
            timeout_ms: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: 0,
            csrf_enabled: false,
            client_id: None,
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            offset_minutes: default_offset_minutes(),
            failed_runs_offset_minutes: default_failed_runs_offset_minutes(),
            failed_runs_limit: default_failed_runs_limit(),
            pagination_enabled: true,
            pagination_limit: default_pagination_limit(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            path: default_metrics_path(),
            bind_address: default_bind_address(),
            on_cycle_error: CycleErrorPolicy::default(),
        }
    }
}

impl PrefectConfig {
    /// Delay between retry attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, falling back to defaults if not found
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load(path)
    }

    /// Apply CLI (and env) overrides, then re-validate
    pub fn apply_cli(mut self, cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(ref addr) = cli.bind_address {
            self.server.bind_address = addr.clone();
        }
        if let Some(ref path) = cli.metrics_path {
            self.server.path = path.clone();
        }
        if let Some(ref url) = cli.url {
            self.prefect.url = url.clone();
        }
        if let Some(ref key) = cli.api_key {
            self.prefect.api_key = Some(key.clone());
        }
        if let Some(retries) = cli.max_retries {
            self.prefect.max_retries = retries;
        }
        if let Some(csrf) = cli.csrf_enabled {
            self.prefect.csrf_enabled = csrf;
        }
        if let Some(minutes) = cli.offset_minutes {
            self.collection.offset_minutes = minutes;
        }
        if let Some(enabled) = cli.pagination_enabled {
            self.collection.pagination_enabled = enabled;
        }
        if let Some(limit) = cli.pagination_limit {
            self.collection.pagination_limit = limit;
        }

        self.validate()?;
        Ok(self)
    }

    /// Copy of the configuration with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |v: &mut Option<String>| {
            if v.is_some() {
                *v = Some("********".to_string());
            }
        };
        mask(&mut copy.prefect.api_key);
        mask(&mut copy.prefect.password);
        copy
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.server.port == 0 {
            return invalid("Server port must be greater than 0");
        }

        if !self.server.path.starts_with('/') {
            return invalid("Metrics path must start with '/'");
        }

        if self.server.path == "/" || self.server.path == "/health" {
            return Err(ConfigError::ValidationError(format!(
                "Metrics path '{}' conflicts with a built-in endpoint",
                self.server.path
            )));
        }

        if let Err(e) = url::Url::parse(&self.prefect.url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid Prefect URL '{}': {}",
                self.prefect.url, e
            )));
        }

        if self.prefect.max_retries == 0 {
            return invalid("max_retries must be at least 1");
        }

        if self.collection.pagination_limit == 0 {
            return invalid("pagination_limit must be greater than 0");
        }

        if self.collection.failed_runs_limit == 0 {
            return invalid("failed_runs_limit must be greater than 0");
        }

        match (&self.prefect.username, &self.prefect.password) {
            (Some(_), None) | (None, Some(_)) => {
                return invalid("Basic auth requires both username and password");
            }
            (Some(_), Some(_)) if self.prefect.api_key.is_some() => {
                return invalid("api_key and basic auth are mutually exclusive");
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.path, "/metrics");
        assert_eq!(config.prefect.max_retries, 3);
        assert_eq!(config.collection.pagination_limit, 200);
        assert_eq!(config.server.on_cycle_error, CycleErrorPolicy::Exit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.path = "/health".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.prefect.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_basic_auth_requires_both_fields() {
        let mut config = Config::default();
        config.prefect.username = Some("admin".to_string());
        assert!(config.validate().is_err());

        config.prefect.password = Some("secret".to_string());
        assert!(config.validate().is_ok());

        config.prefect.api_key = Some("pnu_key".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_partial_sections() {
        let config = Config::from_yaml(
            r#"
prefect:
  url: "http://prefect:4200/api"
  csrf_enabled: true
collection:
  pagination_enabled: false
server:
  on_cycle_error: serve_last
"#,
        )
        .unwrap();

        assert_eq!(config.prefect.url, "http://prefect:4200/api");
        assert!(config.prefect.csrf_enabled);
        assert!(!config.collection.pagination_enabled);
        assert_eq!(config.collection.offset_minutes, 5);
        assert_eq!(config.server.on_cycle_error, CycleErrorPolicy::ServeLast);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = Config::from_yaml("prefect:\n  url: \"not a url\"\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let cli = Cli::parse_from([
            "prefect-exporter",
            "--port",
            "9500",
            "--url",
            "http://remote:4200/api",
            "--pagination-limit",
            "50",
        ]);
        let config = Config::default().apply_cli(&cli).unwrap();

        assert_eq!(config.server.port, 9500);
        assert_eq!(config.prefect.url, "http://remote:4200/api");
        assert_eq!(config.collection.pagination_limit, 50);
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = Config::default();
        config.prefect.api_key = Some("pnu_secret".to_string());
        let shown = serde_yaml::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("pnu_secret"));
        assert!(shown.contains("********"));
    }
}
