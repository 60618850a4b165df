//! Prefect API 리소스 레코드
//!
//! Every field is optional: the upstream API owns the schema and absent or
//! `null` fields deserialize to `None`. Unknown fields are ignored.

use serde::Deserialize;
use std::fmt::Display;

/// Placeholder rendered for absent fields and unresolved references
pub const NULL_LABEL: &str = "null";

/// Flow
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Flow {
    pub id: Option<String>,
    pub name: Option<String>,
    pub created: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Deployment
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Deployment {
    pub id: Option<String>,
    pub flow_id: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub paused: Option<bool>,
    pub is_schedule_active: Option<bool>,
    pub status: Option<String>,
    pub work_pool_name: Option<String>,
    pub work_queue_name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub created: Option<String>,
}

impl Deployment {
    /// Schedule activity, mirrored from `paused` when the server omits it
    pub fn schedule_active(&self) -> Option<bool> {
        self.is_schedule_active.or(self.paused.map(|paused| !paused))
    }
}

/// Flow run
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlowRun {
    pub id: Option<String>,
    pub flow_id: Option<String>,
    pub deployment_id: Option<String>,
    pub name: Option<String>,
    pub state_name: Option<String>,
    pub state_id: Option<String>,
    pub state_type: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub total_run_time: Option<f64>,
    pub run_count: Option<i64>,
    pub work_queue_name: Option<String>,
    pub created: Option<String>,
}

impl FlowRun {
    /// Whether the run is currently executing
    pub fn is_running(&self) -> bool {
        self.state_name.as_deref() == Some("Running")
    }
}

/// Work pool
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkPool {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub pool_type: Option<String>,
    pub is_paused: Option<bool>,
    pub status: Option<String>,
    pub default_queue_id: Option<String>,
    pub created: Option<String>,
}

/// Work queue
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkQueue {
    pub id: Option<String>,
    pub work_pool_id: Option<String>,
    pub work_pool_name: Option<String>,
    pub name: Option<String>,
    pub priority: Option<i64>,
    #[serde(rename = "type")]
    pub queue_type: Option<String>,
    pub is_paused: Option<bool>,
    pub status: Option<String>,
    pub created: Option<String>,
    pub status_info: Option<WorkQueueStatus>,
}

/// 워크 큐 상태 상세
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkQueueStatus {
    pub healthy: Option<bool>,
    pub late_runs_count: Option<i64>,
    pub last_polled: Option<String>,
    pub health_check_policy: Option<HealthCheckPolicy>,
}

/// 워크 큐 헬스 체크 정책
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthCheckPolicy {
    pub maximum_late_runs: Option<i64>,
    pub maximum_seconds_since_last_polled: Option<i64>,
}

/// Render an optional field as a label value, substituting [`NULL_LABEL`]
pub fn render_label<T: Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => NULL_LABEL.to_string(),
    }
}

/// Render a tag set as a sorted, comma-joined label value
pub fn render_tags(tags: Option<&[String]>) -> String {
    match tags {
        Some(tags) => {
            let mut sorted: Vec<&str> = tags.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            sorted.join(",")
        }
        None => NULL_LABEL.to_string(),
    }
}
