//! prefect-exporter - Prometheus exporter for the Prefect API
//!
//! This binary serves a Prometheus-compatible metrics endpoint that polls
//! the Prefect REST API on every scrape.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use prefect_exporter::cli::{Cli, OutputFormat};
use prefect_exporter::collector::Collector;
use prefect_exporter::config::Config;
use prefect_exporter::server;

/// One query of the dry-run plan
#[derive(Serialize)]
struct PlannedQuery {
    gateway: &'static str,
    method: &'static str,
    endpoint: String,
    body: Value,
}

#[derive(Serialize)]
struct ValidationReport {
    valid: bool,
    config: Config,
}

#[derive(Serialize)]
struct DryRunReport {
    config: Config,
    queries: Vec<PlannedQuery>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    prefect_exporter::init_logging(&cli.log_level.to_string(), cli.log_format)?;

    let config = Config::load_or_default(&cli.config)?.apply_cli(&cli)?;

    if cli.validate {
        return print_validation(&config, cli.output_format);
    }

    if cli.dry_run {
        return print_dry_run(&config, cli.output_format);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        url = %config.prefect.url,
        "Starting prefect-exporter"
    );

    server::run(config).await
}

fn print_validation(config: &Config, format: OutputFormat) -> Result<()> {
    let report = ValidationReport {
        valid: true,
        config: config.redacted(),
    };

    match format {
        OutputFormat::Text => {
            println!("Configuration is valid");
            print_summary(config);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&report)?),
    }
    Ok(())
}

fn print_dry_run(config: &Config, format: OutputFormat) -> Result<()> {
    let collector = Collector::from_config(config)?;
    let limit = config.collection.pagination_limit;

    let queries: Vec<PlannedQuery> = collector
        .queries(Utc::now())
        .all()
        .into_iter()
        .map(|gateway| PlannedQuery {
            gateway: gateway.name(),
            method: "POST",
            endpoint: gateway.endpoint(),
            body: gateway.page_body(limit, 0),
        })
        .collect();

    match format {
        OutputFormat::Text => {
            print_summary(config);
            println!();
            for query in &queries {
                println!(
                    "  {:<18} {} {} {}",
                    query.gateway, query.method, query.endpoint, query.body
                );
            }
            println!();
            println!("Dry run completed: {} queries planned", queries.len());
        }
        OutputFormat::Json => {
            let report = DryRunReport {
                config: config.redacted(),
                queries,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Yaml => {
            let report = DryRunReport {
                config: config.redacted(),
                queries,
            };
            print!("{}", serde_yaml::to_string(&report)?);
        }
    }
    Ok(())
}

fn print_summary(config: &Config) {
    let auth = if config.prefect.api_key.is_some() {
        "api key"
    } else if config.prefect.username.is_some() {
        "basic"
    } else {
        "none"
    };

    println!("  Prefect API:  {}", config.prefect.url);
    println!("  Auth:         {}", auth);
    println!("  CSRF:         {}", config.prefect.csrf_enabled);
    println!(
        "  Retries:      {} attempts, {} ms delay",
        config.prefect.max_retries, config.prefect.retry_delay_ms
    );
    println!(
        "  Window:       {} min (failed runs: {} min, limit {})",
        config.collection.offset_minutes,
        config.collection.failed_runs_offset_minutes,
        config.collection.failed_runs_limit
    );
    println!(
        "  Pagination:   {} (limit {})",
        config.collection.pagination_enabled, config.collection.pagination_limit
    );
    println!(
        "  Listen:       {}:{}{}",
        config.server.bind_address, config.server.port, config.server.path
    );
    println!("  On failure:   {:?}", config.server.on_cycle_error);
}
