//! HTTP server module
//!
//! Provides the Axum-based HTTP server for serving metrics.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::signal;
use tokio::sync::{watch, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::exporter::{Exporter, Snapshot};
use crate::metrics::ExporterMetrics;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Cycle runner
    pub exporter: Arc<Exporter>,
    /// Last successful cycle
    pub last_good: Arc<RwLock<Option<Arc<Snapshot>>>>,
    /// Exporter self-metrics
    pub metrics: Arc<ExporterMetrics>,
    /// Set to the failure reason when the server must stop
    pub fatal: Arc<watch::Sender<Option<String>>>,
}

impl AppState {
    /// Create the state and a receiver that fires when a fatal cycle error is recorded
    pub fn new(
        config: Config,
        exporter: Exporter,
        metrics: ExporterMetrics,
    ) -> (Self, watch::Receiver<Option<String>>) {
        let (fatal, fatal_rx) = watch::channel(None);
        let state = Self {
            config: Arc::new(config),
            exporter: Arc::new(exporter),
            last_good: Arc::new(RwLock::new(None)),
            metrics: Arc::new(metrics),
            fatal: Arc::new(fatal),
        };
        (state, fatal_rx)
    }
}

/// Build the router with the configured metrics path
pub fn router(state: AppState) -> Router {
    let metrics_path = state.config.server.path.clone();

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(&metrics_path, get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
///
/// Checks Prefect health first; an unreachable API aborts startup. The server
/// version lookup is best effort.
///
/// # Errors
/// Returns an error if startup fails, or if the server stopped because a
/// collection cycle failed under the `exit` policy
pub async fn run(config: Config) -> Result<()> {
    let exporter = Exporter::from_config(&config).context("Failed to create Prefect client")?;
    let client = exporter.collector().client();

    client
        .health_check()
        .await
        .with_context(|| format!("Prefect API at {} is not healthy", client.base_url()))?;

    let metrics = ExporterMetrics::new();
    match client.server_version().await {
        Ok(version) => {
            info!(server_version = %version, "Connected to Prefect");
            metrics.set_server_version(version);
        }
        Err(e) => warn!(error = %e, "Could not determine Prefect server version"),
    }

    let addr = bind_addr(&config)?;
    let metrics_path = config.server.path.clone();

    let (state, fatal) = AppState::new(config, exporter, metrics);
    let app = router(state);

    info!(address = %addr, metrics_path = %metrics_path, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(fatal.clone()))
        .await?;

    let reason = fatal.borrow().clone();
    if let Some(reason) = reason {
        anyhow::bail!("Stopped after a failed collection cycle: {}", reason);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Parse the bind address; "localhost" maps to the IPv4 loopback
fn bind_addr(config: &Config) -> Result<SocketAddr> {
    let bind_address = &config.server.bind_address;
    let ip: std::net::IpAddr = if bind_address == "localhost" {
        std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)
    } else {
        bind_address.parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid bind_address '{}': {}. Use an IP address (e.g., '0.0.0.0', '127.0.0.1') or 'localhost'.",
                bind_address,
                e
            )
        })?
    };
    Ok(SocketAddr::from((ip, config.server.port)))
}

/// Wait for a shutdown signal or a fatal cycle error
async fn shutdown_signal(mut fatal: watch::Receiver<Option<String>>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let failed = async {
        if fatal.wait_for(Option::is_some).await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
        _ = failed => {
            warn!("Collection cycle failed, shutting down");
        }
    }
}
