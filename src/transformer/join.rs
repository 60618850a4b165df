//! Cross-resource joins and aggregation
//!
//! Resolves ids to display names and precomputes the per-cycle aggregates
//! the record builder needs. Unresolved references become [`NULL_LABEL`]
//! rather than errors.

use std::collections::{BTreeMap, HashMap};

use crate::collector::{render_label, Collections, FlowRun, NULL_LABEL};

/// Key of the flow-run state tally
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey {
    pub deployment_name: String,
    pub flow_name: String,
    pub state_name: String,
    pub work_queue_name: String,
}

/// Most recent failed run ids per (deployment id, flow id)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailedRunIndex {
    limit: usize,
    groups: BTreeMap<(String, String), Vec<String>>,
}

impl FailedRunIndex {
    /// Group `runs` (newest first), keeping at most `limit` ids per key
    pub fn build<'a>(runs: impl IntoIterator<Item = &'a FlowRun>, limit: usize) -> Self {
        let mut index = Self {
            limit,
            groups: BTreeMap::new(),
        };
        for run in runs {
            index.push(run);
        }
        index
    }

    fn push(&mut self, run: &FlowRun) {
        let key = (
            render_label(run.deployment_id.as_deref()),
            render_label(run.flow_id.as_deref()),
        );
        let ids = self.groups.entry(key).or_default();
        if ids.len() < self.limit {
            ids.push(render_label(run.id.as_deref()));
        }
    }

    /// Failed run ids for one pair, newest first
    pub fn get(&self, deployment_id: &str, flow_id: &str) -> &[String] {
        self.groups
            .get(&(deployment_id.to_string(), flow_id.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All `(deployment_id, flow_id, run_id)` triples
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.groups.iter().flat_map(|((deployment_id, flow_id), ids)| {
            ids.iter()
                .map(move |id| (deployment_id.as_str(), flow_id.as_str(), id.as_str()))
        })
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no failed runs were indexed
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Lookup tables and aggregates for one cycle
#[derive(Debug, Clone, Default)]
pub struct JoinedView {
    flow_names: HashMap<String, String>,
    deployment_names: HashMap<String, String>,
    work_pool_names: HashMap<String, String>,
    failed_runs: FailedRunIndex,
    state_tally: BTreeMap<StateKey, u64>,
    run_time_by_flow: BTreeMap<String, f64>,
}

impl JoinedView {
    /// Build the view over a cycle's collections
    pub fn build(collections: &Collections, failed_runs_limit: usize) -> Self {
        let mut view = Self {
            flow_names: name_map(collections.flows.iter().map(|f| (&f.id, &f.name))),
            deployment_names: name_map(
                collections
                    .deployments
                    .iter()
                    .map(|d| (&d.id, &d.name)),
            ),
            work_pool_names: name_map(collections.work_pools.iter().map(|p| (&p.id, &p.name))),
            failed_runs: FailedRunIndex::build(&collections.failed_flow_runs, failed_runs_limit),
            ..Self::default()
        };

        for run in &collections.recent_flow_runs {
            let key = StateKey {
                deployment_name: view.deployment_name(run.deployment_id.as_deref()),
                flow_name: view.flow_name(run.flow_id.as_deref()),
                state_name: render_label(run.state_name.as_deref()),
                work_queue_name: render_label(run.work_queue_name.as_deref()),
            };
            *view.state_tally.entry(key).or_default() += 1;

            *view
                .run_time_by_flow
                .entry(render_label(run.flow_id.as_deref()))
                .or_default() += run.total_run_time.unwrap_or(0.0);
        }

        view
    }

    /// Flow name for an id, or the sentinel
    pub fn flow_name(&self, flow_id: Option<&str>) -> String {
        lookup(&self.flow_names, flow_id)
    }

    /// Deployment name for an id, or the sentinel
    pub fn deployment_name(&self, deployment_id: Option<&str>) -> String {
        lookup(&self.deployment_names, deployment_id)
    }

    /// Work pool name for an id, or the sentinel
    pub fn work_pool_name(&self, work_pool_id: Option<&str>) -> String {
        lookup(&self.work_pool_names, work_pool_id)
    }

    /// Failed run index
    pub fn failed_runs(&self) -> &FailedRunIndex {
        &self.failed_runs
    }

    /// Run counts per state key, in key order
    pub fn state_tally(&self) -> &BTreeMap<StateKey, u64> {
        &self.state_tally
    }

    /// Summed run time per flow id, in id order
    pub fn run_time_by_flow(&self) -> &BTreeMap<String, f64> {
        &self.run_time_by_flow
    }
}

fn name_map<'a>(
    pairs: impl Iterator<Item = (&'a Option<String>, &'a Option<String>)>,
) -> HashMap<String, String> {
    pairs
        .filter_map(|(id, name)| {
            let id = id.as_ref()?;
            Some((id.clone(), render_label(name.as_deref())))
        })
        .collect()
}

fn lookup(names: &HashMap<String, String>, id: Option<&str>) -> String {
    id.and_then(|id| names.get(id))
        .cloned()
        .unwrap_or_else(|| NULL_LABEL.to_string())
}
