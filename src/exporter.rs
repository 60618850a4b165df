//! Collection cycles
//!
//! [`Exporter`] owns the collector and runs one cycle at a time: fetch every
//! resource, join, and hand back a [`Snapshot`] the caller can render.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::collector::{Collections, Collector, CycleQueries};
use crate::config::Config;
use crate::error::{CollectorError, CycleError};
use crate::transformer::{JoinedView, MetricFamily, MetricRecordBuilder};

/// Result of one successful cycle
#[derive(Debug, Clone)]
pub struct Snapshot {
    collections: Collections,
    view: JoinedView,
    collected_at: DateTime<Utc>,
}

impl Snapshot {
    /// Join `collections` into a snapshot
    pub fn new(collections: Collections, failed_runs_limit: usize, collected_at: DateTime<Utc>) -> Self {
        let view = JoinedView::build(&collections, failed_runs_limit);
        Self {
            collections,
            view,
            collected_at,
        }
    }

    /// Metric families, in exposition order
    pub fn records(&self) -> impl Iterator<Item = MetricFamily> + '_ {
        MetricRecordBuilder::new(&self.collections, &self.view).records()
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn view(&self) -> &JoinedView {
        &self.view
    }

    /// Instant the cycle's windows were anchored at
    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }
}

/// Runs collection cycles
pub struct Exporter {
    collector: Collector,
    failed_runs_limit: usize,
    cycle_lock: Mutex<()>,
}

impl Exporter {
    pub fn new(collector: Collector, failed_runs_limit: usize) -> Self {
        Self {
            collector,
            failed_runs_limit,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Build an exporter from configuration
    pub fn from_config(config: &Config) -> Result<Self, CollectorError> {
        Ok(Self::new(
            Collector::from_config(config)?,
            config.collection.failed_runs_limit,
        ))
    }

    /// Run one cycle anchored at the current time
    ///
    /// Concurrent callers are serialized; each gets its own cycle.
    pub async fn collect(&self) -> Result<Snapshot, CycleError> {
        let _guard = self.cycle_lock.lock().await;
        self.collect_at(Utc::now()).await
    }

    /// Run one cycle anchored at `now`
    #[instrument(skip(self))]
    pub async fn collect_at(&self, now: DateTime<Utc>) -> Result<Snapshot, CycleError> {
        let collections = self.collector.collect(now).await?;
        let snapshot = Snapshot::new(collections, self.failed_runs_limit, now);

        info!(
            deployments = snapshot.collections.deployments.len(),
            flows = snapshot.collections.flows.len(),
            flow_runs = snapshot.collections.active_flow_runs.len(),
            failed_groups = snapshot.view.failed_runs().len(),
            "Collection cycle complete"
        );

        Ok(snapshot)
    }

    /// Queries a cycle at `now` would issue
    pub fn queries(&self, now: DateTime<Utc>) -> CycleQueries {
        self.collector.queries(now)
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }
}
