//! Resource gateways
//!
//! A gateway is a named query against one Prefect `*/filter` endpoint: the
//! resource path, an optional sort order and the filter payload. Gateways are
//! plain data; the [`Paginator`](super::Paginator) runs them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// A filter query against one resource collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gateway {
    name: &'static str,
    resource: &'static str,
    sort: Option<&'static str>,
    filter: Map<String, Value>,
}

impl Gateway {
    fn new(name: &'static str, resource: &'static str, sort: Option<&'static str>) -> Self {
        Self {
            name,
            resource,
            sort,
            filter: Map::new(),
        }
    }

    fn with_filter(mut self, key: &str, value: Value) -> Self {
        self.filter.insert(key.to_string(), value);
        self
    }

    /// All deployments
    pub fn deployments() -> Self {
        Self::new("deployments", "deployments", Some("NAME_ASC"))
    }

    /// All flows
    pub fn flows() -> Self {
        Self::new("flows", "flows", Some("NAME_ASC"))
    }

    /// All work pools
    pub fn work_pools() -> Self {
        Self::new("work_pools", "work_pools", None)
    }

    /// All work queues
    pub fn work_queues() -> Self {
        Self::new("work_queues", "work_queues", None)
    }

    /// Flow runs that started after `after`
    pub fn recent_flow_runs(after: DateTime<Utc>) -> Self {
        Self::new("recent_flow_runs", "flow_runs", Some("ID_DESC")).with_filter(
            "flow_runs",
            json!({
                "operator": "and_",
                "start_time": {"after_": format_timestamp(after)},
            }),
        )
    }

    /// Flow runs that ended after `after`, or have not ended yet
    pub fn active_flow_runs(after: DateTime<Utc>) -> Self {
        Self::new("active_flow_runs", "flow_runs", Some("ID_DESC")).with_filter(
            "flow_runs",
            json!({
                "operator": "and_",
                "end_time": {"after_": format_timestamp(after)},
            }),
        )
    }

    /// Failed runs of deployments that started after `after`, newest first
    pub fn failed_flow_runs(after: DateTime<Utc>) -> Self {
        Self::new("failed_flow_runs", "flow_runs", Some("START_TIME_DESC")).with_filter(
            "flow_runs",
            json!({
                "operator": "and_",
                "state": {"type": {"any_": ["FAILED"]}},
                "start_time": {"after_": format_timestamp(after)},
                "deployment_id": {"is_null_": false},
            }),
        )
    }

    /// Gateway name, used in logs and errors
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Endpoint path relative to the API base URL
    pub fn endpoint(&self) -> String {
        format!("{}/filter", self.resource)
    }

    /// Request body for one page
    pub fn page_body(&self, limit: usize, offset: usize) -> Value {
        let mut body = self.filter.clone();
        if let Some(sort) = self.sort {
            body.insert("sort".to_string(), json!(sort));
        }
        body.insert("limit".to_string(), json!(limit));
        body.insert("offset".to_string(), json!(offset));
        Value::Object(body)
    }
}

/// Format a timestamp the way the Prefect API filters expect it
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(noon()), "2024-03-01T12:00:00.000000Z");
    }

    #[test]
    fn test_plain_gateway_body() {
        let body = Gateway::deployments().page_body(200, 400);
        assert_eq!(
            body,
            json!({"sort": "NAME_ASC", "limit": 200, "offset": 400})
        );
        assert_eq!(Gateway::deployments().endpoint(), "deployments/filter");
    }

    #[test]
    fn test_unsorted_gateway_body() {
        let body = Gateway::work_queues().page_body(50, 0);
        assert_eq!(body, json!({"limit": 50, "offset": 0}));
    }

    #[test]
    fn test_recent_and_active_windows_differ() {
        let recent = Gateway::recent_flow_runs(noon()).page_body(200, 0);
        let active = Gateway::active_flow_runs(noon()).page_body(200, 0);

        assert_eq!(
            recent["flow_runs"]["start_time"]["after_"],
            "2024-03-01T12:00:00.000000Z"
        );
        assert!(recent["flow_runs"].get("end_time").is_none());
        assert_eq!(
            active["flow_runs"]["end_time"]["after_"],
            "2024-03-01T12:00:00.000000Z"
        );
        assert_eq!(recent["flow_runs"]["operator"], "and_");
    }

    #[test]
    fn test_failed_gateway_filter() {
        let gateway = Gateway::failed_flow_runs(noon());
        let body = gateway.page_body(200, 0);

        assert_eq!(gateway.endpoint(), "flow_runs/filter");
        assert_eq!(body["sort"], "START_TIME_DESC");
        assert_eq!(body["flow_runs"]["state"]["type"]["any_"], json!(["FAILED"]));
        assert_eq!(body["flow_runs"]["deployment_id"]["is_null_"], json!(false));
    }
}
