//! HTTP request handlers
//!
//! Contains handlers for all HTTP endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use super::AppState;
use crate::config::CycleErrorPolicy;
use crate::error::{AppError, AppResult};
use crate::exporter::Snapshot;
use crate::transformer::{PrometheusFormatter, CONTENT_TYPE};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Health status
    status: String,
    /// Application version
    version: String,
    /// Prefect server version, if known
    server_version: Option<String>,
    /// Completed collection cycles
    cycles: u64,
    /// Failed collection cycles
    failures: u64,
}

/// Root endpoint - displays basic info
pub async fn root(State(state): State<AppState>) -> Html<String> {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Prefect Exporter</title>
</head>
<body>
    <h1>Prefect Exporter</h1>
    <p>Version: {}</p>
    <p>Prefect API: {}</p>
    <ul>
        <li><a href="/health">Health Check</a></li>
        <li><a href="{}">Metrics</a></li>
    </ul>
</body>
</html>"#,
        env!("CARGO_PKG_VERSION"),
        state.exporter.collector().client().base_url(),
        state.config.server.path
    );
    Html(html)
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        server_version: state.metrics.server_version().map(str::to_string),
        cycles: state.metrics.cycles(),
        failures: state.metrics.failures(),
    })
}

/// Metrics endpoint - runs one collection cycle and returns Prometheus format
///
/// A failed cycle never publishes partial metrics. Under the `exit` policy
/// the failure is reported and the server is told to stop; under
/// `serve_last` the previous snapshot is served instead.
#[instrument(skip(state), name = "metrics_handler")]
pub async fn metrics(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let start = Instant::now();

    let snapshot = match state.exporter.collect().await {
        Ok(snapshot) => {
            let snapshot = Arc::new(snapshot);
            state.metrics.record_success(start.elapsed());
            *state.last_good.write().await = Some(Arc::clone(&snapshot));
            snapshot
        }
        Err(e) => {
            state.metrics.record_failure();
            match state.config.server.on_cycle_error {
                CycleErrorPolicy::Exit => {
                    error!(error = %e, "Collection cycle failed, stopping exporter");
                    state.fatal.send_replace(Some(e.to_string()));
                    return Err(AppError::Cycle(e));
                }
                CycleErrorPolicy::ServeLast => {
                    warn!(error = %e, "Collection cycle failed, serving last snapshot");
                    last_snapshot(&state).await?
                }
            }
        }
    };

    let formatter = PrometheusFormatter::new();
    let mut output = formatter.format(snapshot.records());
    for family in state.metrics.families() {
        formatter.write_family(&mut output, &family);
    }

    debug!(
        duration_ms = start.elapsed().as_millis() as u64,
        bytes = output.len(),
        "Metrics scrape complete"
    );

    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], output))
}

async fn last_snapshot(state: &AppState) -> AppResult<Arc<Snapshot>> {
    state
        .last_good
        .read()
        .await
        .clone()
        .ok_or(AppError::NoSnapshot)
}
