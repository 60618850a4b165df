//! Metric record builder
//!
//! Turns one cycle's collections and joined view into metric families. The
//! families are produced lazily, in a fixed order, so a caller can stream
//! them into the formatter without holding the whole exposition text.

use crate::collector::{render_label, render_tags, Collections, NULL_LABEL};

use super::family::MetricFamily;
use super::join::JoinedView;

type Stage<'a> = fn(&MetricRecordBuilder<'a>) -> MetricFamily;

/// Builds the Prefect metric families for one cycle
#[derive(Debug, Clone, Copy)]
pub struct MetricRecordBuilder<'a> {
    collections: &'a Collections,
    view: &'a JoinedView,
}

impl<'a> MetricRecordBuilder<'a> {
    pub fn new(collections: &'a Collections, view: &'a JoinedView) -> Self {
        Self { collections, view }
    }

    /// All families, in exposition order
    pub fn records(self) -> impl Iterator<Item = MetricFamily> + 'a {
        let stages: [Stage<'a>; 13] = [
            Self::deployments_total,
            Self::deployment_info,
            Self::flows_total,
            Self::flow_info,
            Self::flow_runs_total,
            Self::flow_run_time,
            Self::flow_run_info,
            Self::flow_run_states,
            Self::last_failed_runs,
            Self::work_pools_total,
            Self::work_pool_info,
            Self::work_queues_total,
            Self::work_queue_info,
        ];
        stages.into_iter().map(move |stage| stage(&self))
    }

    fn deployments_total(&self) -> MetricFamily {
        total(
            "prefect_deployments_total",
            "Prefect total deployments",
            self.collections.deployments.len(),
        )
    }

    fn deployment_info(&self) -> MetricFamily {
        let mut family = MetricFamily::gauge(
            "prefect_info_deployment",
            "Prefect deployment info",
            &[
                "created",
                "deployment_id",
                "deployment_name",
                "flow_id",
                "flow_name",
                "is_schedule_active",
                "paused",
                "path",
                "status",
                "tags",
                "work_pool_name",
                "work_queue_name",
            ],
        );

        for d in &self.collections.deployments {
            family.add_sample(
                vec![
                    render_label(d.created.as_deref()),
                    render_label(d.id.as_deref()),
                    render_label(d.name.as_deref()),
                    render_label(d.flow_id.as_deref()),
                    self.view.flow_name(d.flow_id.as_deref()),
                    render_label(d.schedule_active()),
                    render_label(d.paused),
                    render_label(d.path.as_deref()),
                    render_label(d.status.as_deref()),
                    render_tags(d.tags.as_deref()),
                    render_label(d.work_pool_name.as_deref()),
                    render_label(d.work_queue_name.as_deref()),
                ],
                1.0,
            );
        }
        family
    }

    fn flows_total(&self) -> MetricFamily {
        total(
            "prefect_flows_total",
            "Prefect total flows",
            self.collections.flows.len(),
        )
    }

    fn flow_info(&self) -> MetricFamily {
        let mut family = MetricFamily::gauge(
            "prefect_info_flows",
            "Prefect flow info",
            &["created", "flow_id", "flow_name"],
        );
        for f in &self.collections.flows {
            family.add_sample(
                vec![
                    render_label(f.created.as_deref()),
                    render_label(f.id.as_deref()),
                    render_label(f.name.as_deref()),
                ],
                1.0,
            );
        }
        family
    }

    fn flow_runs_total(&self) -> MetricFamily {
        total(
            "prefect_flow_runs_total",
            "Prefect total flow runs",
            self.collections.active_flow_runs.len(),
        )
    }

    fn flow_run_time(&self) -> MetricFamily {
        let mut family = MetricFamily::gauge(
            "prefect_flow_runs_total_run_time",
            "Prefect flow-run total run time in seconds",
            &["flow_id", "flow_name"],
        );
        for (flow_id, seconds) in self.view.run_time_by_flow() {
            let flow_name = self.view.flow_name(Some(flow_id.as_str()));
            family.add_sample(vec![flow_id.clone(), flow_name], *seconds);
        }
        family
    }

    fn flow_run_info(&self) -> MetricFamily {
        let mut family = MetricFamily::gauge(
            "prefect_info_flow_runs",
            "Prefect flow runs info",
            &[
                "created",
                "deployment_id",
                "deployment_name",
                "end_time",
                "flow_id",
                "flow_name",
                "flow_run_id",
                "flow_run_name",
                "run_count",
                "start_time",
                "state_id",
                "state_name",
                "total_run_time",
                "work_queue_name",
            ],
        );

        for run in &self.collections.active_flow_runs {
            let running = if run.is_running() { 1.0 } else { 0.0 };
            family.add_sample(
                vec![
                    render_label(run.created.as_deref()),
                    render_label(run.deployment_id.as_deref()),
                    self.view.deployment_name(run.deployment_id.as_deref()),
                    render_label(run.end_time.as_deref()),
                    render_label(run.flow_id.as_deref()),
                    self.view.flow_name(run.flow_id.as_deref()),
                    render_label(run.id.as_deref()),
                    render_label(run.name.as_deref()),
                    render_label(run.run_count),
                    render_label(run.start_time.as_deref()),
                    render_label(run.state_id.as_deref()),
                    render_label(run.state_name.as_deref()),
                    render_label(run.total_run_time),
                    render_label(run.work_queue_name.as_deref()),
                ],
                running,
            );
        }
        family
    }

    fn flow_run_states(&self) -> MetricFamily {
        let mut family = MetricFamily::gauge(
            "prefect_flow_runs_state_total",
            "Prefect flow runs by state",
            &["deployment_name", "flow_name", "state_name", "work_queue_name"],
        );
        for (key, count) in self.view.state_tally() {
            family.add_sample(
                vec![
                    key.deployment_name.clone(),
                    key.flow_name.clone(),
                    key.state_name.clone(),
                    key.work_queue_name.clone(),
                ],
                *count as f64,
            );
        }
        family
    }

    fn last_failed_runs(&self) -> MetricFamily {
        let mut family = MetricFamily::gauge(
            "prefect_info_last_failed_flow_runs",
            "Prefect most recent failed flow runs per deployment",
            &[
                "deployment_id",
                "deployment_name",
                "flow_id",
                "flow_name",
                "flow_run_id",
            ],
        );
        for (deployment_id, flow_id, run_id) in self.view.failed_runs().iter() {
            family.add_sample(
                vec![
                    deployment_id.to_string(),
                    self.view.deployment_name(Some(deployment_id)),
                    flow_id.to_string(),
                    self.view.flow_name(Some(flow_id)),
                    run_id.to_string(),
                ],
                1.0,
            );
        }
        family
    }

    fn work_pools_total(&self) -> MetricFamily {
        total(
            "prefect_work_pools_total",
            "Prefect total work pools",
            self.collections.work_pools.len(),
        )
    }

    fn work_pool_info(&self) -> MetricFamily {
        let mut family = MetricFamily::gauge(
            "prefect_info_work_pools",
            "Prefect work pools info",
            &[
                "created",
                "work_queue_id",
                "work_pool_id",
                "is_paused",
                "work_pool_name",
                "type",
                "status",
            ],
        );
        for pool in &self.collections.work_pools {
            family.add_sample(
                vec![
                    render_label(pool.created.as_deref()),
                    render_label(pool.default_queue_id.as_deref()),
                    render_label(pool.id.as_deref()),
                    render_label(pool.is_paused),
                    render_label(pool.name.as_deref()),
                    render_label(pool.pool_type.as_deref()),
                    render_label(pool.status.as_deref()),
                ],
                active_value(pool.is_paused),
            );
        }
        family
    }

    fn work_queues_total(&self) -> MetricFamily {
        total(
            "prefect_work_queues_total",
            "Prefect total work queues",
            self.collections.work_queues.len(),
        )
    }

    fn work_queue_info(&self) -> MetricFamily {
        let mut family = MetricFamily::gauge(
            "prefect_info_work_queues",
            "Prefect work queues info",
            &[
                "created",
                "work_queue_id",
                "is_paused",
                "work_queue_name",
                "priority",
                "type",
                "status",
                "work_pool_id",
                "work_pool_name",
                "healthy",
                "late_runs_count",
                "last_polled",
                "maximum_late_runs",
                "maximum_seconds_since_last_polled",
            ],
        );

        for queue in &self.collections.work_queues {
            let status = queue.status_info.as_ref();
            let policy = status.and_then(|s| s.health_check_policy.as_ref());

            // Joined pool name first, then the queue's own field
            let pool_name = match self.view.work_pool_name(queue.work_pool_id.as_deref()) {
                name if name != NULL_LABEL => name,
                _ => render_label(queue.work_pool_name.as_deref()),
            };

            family.add_sample(
                vec![
                    render_label(queue.created.as_deref()),
                    render_label(queue.id.as_deref()),
                    render_label(queue.is_paused),
                    render_label(queue.name.as_deref()),
                    render_label(queue.priority),
                    render_label(queue.queue_type.as_deref()),
                    render_label(queue.status.as_deref()),
                    render_label(queue.work_pool_id.as_deref()),
                    pool_name,
                    render_label(status.and_then(|s| s.healthy)),
                    render_label(status.and_then(|s| s.late_runs_count)),
                    render_label(status.and_then(|s| s.last_polled.as_deref())),
                    render_label(policy.and_then(|p| p.maximum_late_runs)),
                    render_label(policy.and_then(|p| p.maximum_seconds_since_last_polled)),
                ],
                active_value(queue.is_paused),
            );
        }
        family
    }
}

fn total(name: &str, help: &str, count: usize) -> MetricFamily {
    MetricFamily::gauge(name, help, &[]).with_sample(vec![], count as f64)
}

/// 0 when paused, 1 otherwise
fn active_value(is_paused: Option<bool>) -> f64 {
    if is_paused.unwrap_or(false) {
        0.0
    } else {
        1.0
    }
}
