//! prefect-exporter library
//!
//! This crate provides the core functionality for polling the Prefect REST
//! API and exporting deployments, flows, flow runs, work pools and work
//! queues in Prometheus format.

pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod metrics;
pub mod server;
pub mod transformer;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::cli::LogFormat;

/// Initialize the logging subsystem
///
/// Logs go to stderr so `--validate` and `--dry-run` output stays clean.
/// `RUST_LOG` overrides `level` when set.
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error)
/// * `format` - Text or JSON lines
///
/// # Errors
/// Returns an error if the logging system fails to initialize
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let fmt_layer = match format {
        LogFormat::Text => fmt_layer.boxed(),
        LogFormat::Json => fmt_layer.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
