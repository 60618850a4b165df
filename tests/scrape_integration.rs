//! Scrape integration tests
//!
//! End-to-end tests for the scrape pipeline that verify:
//! - A full collection cycle against a mock Prefect API
//! - Joins and the "null" placeholder in the exposition output
//! - The cycle error policies

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use prefect_exporter::config::{Config, CycleErrorPolicy};
use prefect_exporter::exporter::Exporter;
use prefect_exporter::metrics::ExporterMetrics;
use prefect_exporter::server::{router, AppState};
use prefect_exporter::transformer::PrometheusFormatter;
use serde_json::{json, Value};
use tokio::sync::watch;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn flows() -> Value {
    json!([
        {"id": "f1", "name": "etl", "created": "2024-01-01T00:00:00Z"},
        {"id": "f2", "name": "report", "created": "2024-01-02T00:00:00Z"},
        {"id": "f3", "name": "cleanup", "created": "2024-01-03T00:00:00Z"}
    ])
}

fn deployments() -> Value {
    json!([
        {
            "id": "d1",
            "flow_id": "f1",
            "name": "nightly",
            "paused": false,
            "status": "READY",
            "tags": ["prod", "etl"],
            "work_pool_name": "k8s",
            "work_queue_name": "default"
        },
        {
            "id": "d2",
            "flow_id": null,
            "name": "adhoc",
            "paused": true
        }
    ])
}

fn flow_runs() -> Value {
    json!([
        {"id": "r5", "flow_id": "f1", "deployment_id": "d1", "name": "brave-fox", "state_name": "Running", "total_run_time": 12.0, "run_count": 1, "work_queue_name": "default"},
        {"id": "r4", "flow_id": "f1", "deployment_id": "d1", "name": "calm-owl", "state_name": "Completed", "total_run_time": 30.0, "run_count": 1, "work_queue_name": "default"},
        {"id": "r3", "flow_id": "f2", "deployment_id": null, "name": "eager-cat", "state_name": "Completed", "total_run_time": 5.5, "run_count": 1},
        {"id": "r2", "flow_id": "f2", "deployment_id": null, "name": "fast-elk", "state_name": "Completed", "total_run_time": 4.5, "run_count": 2},
        {"id": "r1", "flow_id": "f3", "deployment_id": "d1", "name": "gray-yak", "state_name": "Failed", "run_count": 1, "work_queue_name": "default"}
    ])
}

fn failed_runs() -> Value {
    json!([
        {"id": "r1", "flow_id": "f3", "deployment_id": "d1", "state_name": "Failed"},
        {"id": "r0", "flow_id": "f1", "deployment_id": "d1", "state_name": "Failed"}
    ])
}

fn work_pools() -> Value {
    json!([
        {"id": "p1", "name": "k8s", "type": "kubernetes", "is_paused": false, "status": "READY", "default_queue_id": "q1"}
    ])
}

fn work_queues() -> Value {
    json!([
        {
            "id": "q1",
            "name": "default",
            "work_pool_id": "p1",
            "priority": 1,
            "is_paused": false,
            "status": "READY",
            "status_info": {
                "healthy": true,
                "late_runs_count": 0,
                "last_polled": "2024-03-01T11:59:00Z",
                "health_check_policy": {"maximum_late_runs": 0, "maximum_seconds_since_last_polled": 60}
            }
        }
    ])
}

/// First page of a gateway; later pages fall through to the empty catch-all
async fn mount_page(server: &MockServer, resource: &str, extra: Option<Value>, priority: u8, page: Value) {
    let mut mock = Mock::given(method("POST"))
        .and(path(format!("/api/{}/filter", resource)))
        .and(body_partial_json(json!({"offset": 0})));
    if let Some(extra) = extra {
        mock = mock.and(body_partial_json(extra));
    }
    mock.respond_with(ResponseTemplate::new(200).set_body_json(page))
        .with_priority(priority)
        .mount(server)
        .await;
}

/// Mock Prefect API serving a small, fully populated workspace
async fn create_mock_prefect_server() -> MockServer {
    let server = MockServer::start().await;

    mount_page(&server, "flows", None, 4, flows()).await;
    mount_page(&server, "deployments", None, 4, deployments()).await;
    mount_page(&server, "work_pools", None, 4, work_pools()).await;
    mount_page(&server, "work_queues", None, 4, work_queues()).await;
    mount_page(
        &server,
        "flow_runs",
        Some(json!({"sort": "START_TIME_DESC"})),
        1,
        failed_runs(),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/api/flow_runs/filter"))
        .and(body_partial_json(json!({"offset": 0})))
        .and(body_string_contains("end_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(flow_runs()))
        .with_priority(2)
        .mount(&server)
        .await;

    mount_page(&server, "flow_runs", None, 3, flow_runs()).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .with_priority(10)
        .mount(&server)
        .await;

    server
}

fn test_config(server: &MockServer, policy: CycleErrorPolicy) -> Config {
    let mut config = Config::default();
    config.prefect.url = format!("{}/api", server.uri());
    config.prefect.max_retries = 1;
    config.server.on_cycle_error = policy;
    config
}

fn app_state(config: Config) -> (AppState, watch::Receiver<Option<String>>) {
    let exporter = Exporter::from_config(&config).expect("Failed to create exporter");
    AppState::new(config, exporter, ExporterMetrics::new())
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, String) {
    let response = router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// Test the full pipeline: fetch, join, build, format
#[tokio::test]
async fn test_full_cycle() {
    let server = create_mock_prefect_server().await;
    let config = test_config(&server, CycleErrorPolicy::Exit);
    let exporter = Exporter::from_config(&config).unwrap();

    let snapshot = exporter.collect().await.expect("Cycle failed");
    assert_eq!(snapshot.collections().flows.len(), 3);
    assert_eq!(snapshot.collections().deployments.len(), 2);
    assert_eq!(snapshot.collections().active_flow_runs.len(), 5);
    assert_eq!(snapshot.collections().failed_flow_runs.len(), 2);

    let families: Vec<_> = snapshot.records().collect();
    assert_eq!(families.len(), 13);

    let output = PrometheusFormatter::new().format(families);

    assert!(output.contains("prefect_deployments_total 2\n"));
    assert!(output.contains("prefect_flows_total 3\n"));
    assert!(output.contains("prefect_flow_runs_total 5\n"));
    assert!(output.contains("prefect_work_pools_total 1\n"));
    assert!(output.contains("prefect_work_queues_total 1\n"));

    // Deployment without a flow resolves to the placeholder
    assert!(output.contains(
        "deployment_id=\"d2\",deployment_name=\"adhoc\",flow_id=\"null\",flow_name=\"null\""
    ));
    assert!(output.contains("flow_name=\"etl\",is_schedule_active=\"true\",paused=\"false\""));
    assert!(output.contains("tags=\"etl,prod\""));

    // Runs without a deployment are tallied under the placeholder
    assert!(output.contains(
        "prefect_flow_runs_state_total{deployment_name=\"null\",flow_name=\"report\",state_name=\"Completed\",work_queue_name=\"null\"} 2\n"
    ));
    assert!(output.contains(
        "prefect_flow_runs_state_total{deployment_name=\"nightly\",flow_name=\"etl\",state_name=\"Running\",work_queue_name=\"default\"} 1\n"
    ));

    assert!(output.contains(
        "prefect_flow_runs_total_run_time{flow_id=\"f1\",flow_name=\"etl\"} 42\n"
    ));
    assert!(output.contains(
        "prefect_flow_runs_total_run_time{flow_id=\"f2\",flow_name=\"report\"} 10\n"
    ));

    assert!(output.contains("flow_run_id=\"r5\",flow_run_name=\"brave-fox\""));
    assert!(output.contains(
        "prefect_info_last_failed_flow_runs{deployment_id=\"d1\",deployment_name=\"nightly\",flow_id=\"f3\",flow_name=\"cleanup\",flow_run_id=\"r1\"} 1\n"
    ));
    assert!(output.contains("work_pool_name=\"k8s\",healthy=\"true\""));
    assert!(output.contains("maximum_seconds_since_last_polled=\"60\"} 1\n"));
}

/// Test the metrics endpoint end to end
#[tokio::test]
async fn test_metrics_endpoint() {
    let server = create_mock_prefect_server().await;
    let (state, fatal) = app_state(test_config(&server, CycleErrorPolicy::Exit));

    let (status, body) = get(&state, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("# TYPE prefect_info_flows gauge"));
    assert!(body.contains("prefect_flow_runs_total 5\n"));
    assert!(body.contains("prefect_exporter_up 1\n"));
    assert!(body.contains("prefect_exporter_cycles_total 1\n"));
    assert!(fatal.borrow().is_none());
    assert!(state.last_good.read().await.is_some());
}

/// A failed cycle under the exit policy reports an error and requests shutdown
#[tokio::test]
async fn test_failed_cycle_exit_policy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (state, fatal) = app_state(test_config(&server, CycleErrorPolicy::Exit));
    let (status, body) = get(&state, "/metrics").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.contains("prefect_"));
    assert!(fatal.borrow().is_some());
    assert_eq!(state.metrics.failures(), 1);
}

/// serve_last without any successful cycle has nothing to serve
#[tokio::test]
async fn test_failed_cycle_without_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (state, fatal) = app_state(test_config(&server, CycleErrorPolicy::ServeLast));
    let (status, _) = get(&state, "/metrics").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(fatal.borrow().is_none());
}

/// serve_last keeps serving the previous snapshot after a failure
#[tokio::test]
async fn test_failed_cycle_serves_last_snapshot() {
    let server = create_mock_prefect_server().await;
    let (state, fatal) = app_state(test_config(&server, CycleErrorPolicy::ServeLast));

    let (status, first) = get(&state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(first.contains("prefect_flows_total 3\n"));

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (status, second) = get(&state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(second.contains("prefect_flows_total 3\n"));
    assert!(second.contains("prefect_exporter_up 0\n"));
    assert!(second.contains("prefect_exporter_cycle_failures_total 1\n"));
    assert!(fatal.borrow().is_none());
}

#[tokio::test]
async fn test_health_and_root_endpoints() {
    let server = MockServer::start().await;
    let (state, _fatal) = app_state(test_config(&server, CycleErrorPolicy::Exit));

    let (status, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["cycles"], 0);

    let (status, body) = get(&state, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("/metrics"));
}

#[tokio::test]
async fn test_custom_metrics_path() {
    let server = create_mock_prefect_server().await;
    let mut config = test_config(&server, CycleErrorPolicy::Exit);
    config.server.path = "/prefect/metrics".to_string();
    let (state, _fatal) = app_state(config);

    let (status, _) = get(&state, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&state, "/prefect/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("prefect_deployments_total 2\n"));
}
