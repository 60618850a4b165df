//! Exporter self-metrics
//!
//! Metrics about the exporter's own operation, appended after the Prefect
//! families on every scrape.
//!
//! # Metrics
//!
//! - `prefect_exporter_info{version="...",server_version="..."}` - Build and upstream versions
//! - `prefect_exporter_up` - 1 when the last cycle succeeded
//! - `prefect_exporter_cycles_total` - Counter of completed cycles
//! - `prefect_exporter_cycle_failures_total` - Counter of failed cycles
//! - `prefect_exporter_scrape_duration_seconds` - Duration of the last successful cycle
//! - `prefect_exporter_last_success_timestamp_seconds` - Unix time of the last successful cycle

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::collector::NULL_LABEL;
use crate::transformer::MetricFamily;

/// Thread-safe counter using atomic operations
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter initialized to 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe gauge using atomic operations
#[derive(Debug)]
pub struct Gauge {
    /// Stored as bits of f64 for atomic operations
    value: AtomicU64,
}

impl Default for Gauge {
    fn default() -> Self {
        Self {
            value: AtomicU64::new(0.0_f64.to_bits()),
        }
    }
}

impl Gauge {
    /// Create a new gauge initialized to 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge to a specific value
    pub fn set(&self, v: f64) {
        self.value.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Set the gauge to the current Unix timestamp
    pub fn set_to_current_time(&self) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.set(timestamp);
    }
}

/// Exporter self-metrics
#[derive(Debug, Default)]
pub struct ExporterMetrics {
    server_version: OnceLock<String>,
    up: Gauge,
    cycles_total: Counter,
    cycle_failures_total: Counter,
    scrape_duration_seconds: Gauge,
    last_success_timestamp: Gauge,
}

impl ExporterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the Prefect server version; only the first call takes effect
    pub fn set_server_version(&self, version: impl Into<String>) {
        let _ = self.server_version.set(version.into());
    }

    /// Prefect server version, if known
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.get().map(String::as_str)
    }

    /// Record a successful cycle
    pub fn record_success(&self, duration: Duration) {
        self.cycles_total.inc();
        self.up.set(1.0);
        self.scrape_duration_seconds.set(duration.as_secs_f64());
        self.last_success_timestamp.set_to_current_time();
    }

    /// Record a failed cycle
    pub fn record_failure(&self) {
        self.cycles_total.inc();
        self.cycle_failures_total.inc();
        self.up.set(0.0);
    }

    /// Completed cycles, successful or not
    pub fn cycles(&self) -> u64 {
        self.cycles_total.get()
    }

    /// Failed cycles
    pub fn failures(&self) -> u64 {
        self.cycle_failures_total.get()
    }

    /// Self-metrics as metric families
    pub fn families(&self) -> Vec<MetricFamily> {
        vec![
            MetricFamily::gauge(
                "prefect_exporter_info",
                "Prefect exporter information",
                &["version", "server_version"],
            )
            .with_sample(
                vec![
                    env!("CARGO_PKG_VERSION").to_string(),
                    self.server_version().unwrap_or(NULL_LABEL).to_string(),
                ],
                1.0,
            ),
            MetricFamily::gauge(
                "prefect_exporter_up",
                "Whether the last collection cycle succeeded",
                &[],
            )
            .with_sample(vec![], self.up.get()),
            MetricFamily::counter(
                "prefect_exporter_cycles_total",
                "Total number of collection cycles",
                &[],
            )
            .with_sample(vec![], self.cycles_total.get() as f64),
            MetricFamily::counter(
                "prefect_exporter_cycle_failures_total",
                "Total number of failed collection cycles",
                &[],
            )
            .with_sample(vec![], self.cycle_failures_total.get() as f64),
            MetricFamily::gauge(
                "prefect_exporter_scrape_duration_seconds",
                "Duration of the last successful collection cycle",
                &[],
            )
            .with_sample(vec![], self.scrape_duration_seconds.get()),
            MetricFamily::gauge(
                "prefect_exporter_last_success_timestamp_seconds",
                "Unix timestamp of the last successful collection cycle",
                &[],
            )
            .with_sample(vec![], self.last_success_timestamp.get()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new();
        assert_eq!(gauge.get(), 0.0);
        gauge.set(42.5);
        assert_eq!(gauge.get(), 42.5);
    }

    #[test]
    fn test_gauge_set_to_current_time() {
        let gauge = Gauge::new();
        gauge.set_to_current_time();
        // Should be a reasonable Unix timestamp (after 2020)
        assert!(gauge.get() > 1577836800.0);
    }

    #[test]
    fn test_record_success_and_failure() {
        let metrics = ExporterMetrics::new();
        metrics.record_success(Duration::from_millis(250));
        metrics.record_failure();

        assert_eq!(metrics.cycles(), 2);
        assert_eq!(metrics.failures(), 1);

        let families = metrics.families();
        let up = families.iter().find(|f| f.name == "prefect_exporter_up").unwrap();
        assert_eq!(up.value_of(&[]), Some(0.0));
        let duration = families
            .iter()
            .find(|f| f.name == "prefect_exporter_scrape_duration_seconds")
            .unwrap();
        assert_eq!(duration.value_of(&[]), Some(0.25));
    }

    #[test]
    fn test_server_version_label() {
        let metrics = ExporterMetrics::new();
        let info = |m: &ExporterMetrics| m.families().remove(0);

        assert_eq!(info(&metrics).value_of(&[("server_version", "null")]), Some(1.0));

        metrics.set_server_version("3.1.0");
        metrics.set_server_version("ignored");
        assert_eq!(metrics.server_version(), Some("3.1.0"));
        assert_eq!(info(&metrics).value_of(&[("server_version", "3.1.0")]), Some(1.0));
    }
}
