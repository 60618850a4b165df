//! CLI argument parsing for prefect-exporter
//!
//! This module provides the command-line interface using clap derive macros.
//!
//! # Options
//!
//! - `--config` / `-c`: Configuration file path (default: config.yaml, env: PREFECT_EXPORTER_CONFIG)
//! - `--port` / `-p`: Server port (env: PREFECT_EXPORTER_PORT)
//! - `--bind-address`: Server bind address (env: PREFECT_EXPORTER_BIND_ADDRESS)
//! - `--metrics-path`: Metrics endpoint path (env: PREFECT_EXPORTER_METRICS_PATH)
//! - `--url`: Prefect API URL (env: PREFECT_API_URL)
//! - `--api-key`: Prefect API key (env: PREFECT_API_KEY)
//! - `--max-retries`: Attempts per request (env: PREFECT_EXPORTER_MAX_RETRIES)
//! - `--csrf-enabled`: Send CSRF token headers (env: PREFECT_CSRF_ENABLED)
//! - `--offset-minutes`: Flow run lookback window (env: PREFECT_EXPORTER_OFFSET_MINUTES)
//! - `--pagination-enabled`: Follow pages until empty (env: PREFECT_EXPORTER_PAGINATION_ENABLED)
//! - `--pagination-limit`: Page size (env: PREFECT_EXPORTER_PAGINATION_LIMIT)
//! - `--validate`: Validate configuration without starting server
//! - `--dry-run`: Show the queries one cycle would issue
//! - `--log-level` / `-l`: Log level (env: PREFECT_EXPORTER_LOG_LEVEL)
//! - `--log-format`: Log line format, text or json (env: PREFECT_EXPORTER_LOG_FORMAT)
//! - `--output-format`: Output format for validate/dry-run (text/json/yaml)
//!
//! # Precedence
//!
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// prefect-exporter - Prometheus exporter for the Prefect API
///
/// Polls deployments, flows, flow runs, work pools and work queues
/// and exports them in Prometheus format.
#[derive(Parser, Debug)]
#[command(name = "prefect-exporter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.yaml",
        env = "PREFECT_EXPORTER_CONFIG"
    )]
    pub config: PathBuf,

    /// Server port (overrides config file)
    #[arg(short, long, value_name = "PORT", env = "PREFECT_EXPORTER_PORT")]
    pub port: Option<u16>,

    /// Server bind address (overrides config file)
    #[arg(long, value_name = "ADDRESS", env = "PREFECT_EXPORTER_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Metrics endpoint path (overrides config file)
    #[arg(long, value_name = "PATH", env = "PREFECT_EXPORTER_METRICS_PATH")]
    pub metrics_path: Option<String>,

    /// Prefect API URL (overrides config file)
    #[arg(long, value_name = "URL", env = "PREFECT_API_URL")]
    pub url: Option<String>,

    /// Prefect API key, sent as a bearer token (overrides config file)
    #[arg(long, value_name = "KEY", env = "PREFECT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Attempts per request before giving up (overrides config file)
    #[arg(long, value_name = "N", env = "PREFECT_EXPORTER_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Send CSRF token headers (overrides config file)
    #[arg(long, env = "PREFECT_CSRF_ENABLED")]
    pub csrf_enabled: Option<bool>,

    /// Flow run lookback window in minutes (overrides config file)
    #[arg(long, value_name = "MINUTES", env = "PREFECT_EXPORTER_OFFSET_MINUTES")]
    pub offset_minutes: Option<u64>,

    /// Follow pages until an empty page is returned (overrides config file)
    #[arg(long, env = "PREFECT_EXPORTER_PAGINATION_ENABLED")]
    pub pagination_enabled: Option<bool>,

    /// Page size (overrides config file)
    #[arg(long, value_name = "N", env = "PREFECT_EXPORTER_PAGINATION_LIMIT")]
    pub pagination_limit: Option<usize>,

    /// Validate configuration without starting server
    #[arg(long)]
    pub validate: bool,

    /// Show the queries one collection cycle would issue
    #[arg(long)]
    pub dry_run: bool,

    /// Log level
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        env = "PREFECT_EXPORTER_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", env = "PREFECT_EXPORTER_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Output format for --validate and --dry-run
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

/// Log level options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Trace level - most verbose
    Trace,
    /// Debug level
    Debug,
    /// Info level - default
    Info,
    /// Warn level
    Warn,
    /// Error level - least verbose
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log line formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Output format options for validate and dry-run modes
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}
