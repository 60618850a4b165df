//! Metric transformation module
//!
//! Joins one cycle's Prefect collections and turns them into Prometheus
//! metric families.
//!
//! # Pipeline
//!
//! ```text
//! Collections → JoinedView → MetricRecordBuilder → PrometheusFormatter
//! ```

mod builder;
mod family;
mod formatter;
mod join;

pub use builder::MetricRecordBuilder;
pub use family::{MetricFamily, MetricKind, Sample};
pub use formatter::{PrometheusFormatter, CONTENT_TYPE};
pub use join::{FailedRunIndex, JoinedView, StateKey};
