//! Prefect 리소스 수집 모듈
//!
//! Prefect REST API에서 deployment, flow, flow run, work pool, work queue를
//! 수집합니다. 한 번의 수집 주기(cycle)는 일곱 개의 gateway 쿼리를 동시에
//! 실행하며, 하나라도 실패하면 주기 전체가 실패합니다.
//!
//! # Example
//!
//! ```ignore
//! use prefect_exporter::collector::{Collector, PrefectClient, Paginator};
//!
//! let client = PrefectClient::new("http://localhost:4200/api", 10_000)?;
//! let collector = Collector::new(client, Paginator::default(), CollectionConfig::default());
//! let collections = collector.collect(chrono::Utc::now()).await?;
//! ```

mod client;
mod gateway;
mod pagination;
mod records;
mod token;

pub use client::{ApiRequest, PrefectClient, RetryConfig, CSRF_CLIENT_HEADER, CSRF_TOKEN_HEADER};
pub use gateway::{format_timestamp, Gateway};
pub use pagination::{Paginator, DEFAULT_PAGE_LIMIT};
pub use records::{
    render_label, render_tags, Deployment, Flow, FlowRun, HealthCheckPolicy, WorkPool, WorkQueue,
    WorkQueueStatus, NULL_LABEL,
};
pub use token::{AuthToken, TokenCache};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::{CollectionConfig, Config};
use crate::error::{CollectorError, CycleError};

/// Result type for collector operations
pub type CollectResult<T> = Result<T, CollectorError>;

/// 한 수집 주기의 결과
#[derive(Debug, Clone, Default)]
pub struct Collections {
    pub deployments: Vec<Deployment>,
    pub flows: Vec<Flow>,
    /// Runs started inside the lookback window
    pub recent_flow_runs: Vec<FlowRun>,
    /// Runs that ended inside the lookback window
    pub active_flow_runs: Vec<FlowRun>,
    /// Failed deployment runs, newest first
    pub failed_flow_runs: Vec<FlowRun>,
    pub work_pools: Vec<WorkPool>,
    pub work_queues: Vec<WorkQueue>,
}

/// The gateway queries of one cycle, with windows anchored at a single instant
#[derive(Debug, Clone, PartialEq)]
pub struct CycleQueries {
    pub deployments: Gateway,
    pub flows: Gateway,
    pub recent_flow_runs: Gateway,
    pub active_flow_runs: Gateway,
    pub failed_flow_runs: Gateway,
    pub work_pools: Gateway,
    pub work_queues: Gateway,
}

impl CycleQueries {
    /// Build the queries for a cycle starting at `now`
    pub fn at(now: DateTime<Utc>, config: &CollectionConfig) -> Self {
        let window_start = minutes_before(now, config.offset_minutes);
        let failed_start = minutes_before(now, config.failed_runs_offset_minutes);

        Self {
            deployments: Gateway::deployments(),
            flows: Gateway::flows(),
            recent_flow_runs: Gateway::recent_flow_runs(window_start),
            active_flow_runs: Gateway::active_flow_runs(window_start),
            failed_flow_runs: Gateway::failed_flow_runs(failed_start),
            work_pools: Gateway::work_pools(),
            work_queues: Gateway::work_queues(),
        }
    }

    /// All queries in metric order
    pub fn all(&self) -> [&Gateway; 7] {
        [
            &self.deployments,
            &self.flows,
            &self.recent_flow_runs,
            &self.active_flow_runs,
            &self.failed_flow_runs,
            &self.work_pools,
            &self.work_queues,
        ]
    }
}

fn minutes_before(now: DateTime<Utc>, value: u64) -> DateTime<Utc> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_minutes)
        .and_then(|offset| now.checked_sub_signed(offset))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Collector 구조체 - 설정 기반 수집 래퍼
pub struct Collector {
    client: PrefectClient,
    paginator: Paginator,
    config: CollectionConfig,
}

impl Collector {
    /// 새 Collector 생성
    pub fn new(client: PrefectClient, paginator: Paginator, config: CollectionConfig) -> Self {
        Self {
            client,
            paginator,
            config,
        }
    }

    /// 설정으로부터 Collector 생성
    pub fn from_config(config: &Config) -> CollectResult<Self> {
        let client = PrefectClient::from_config(&config.prefect)?;
        let paginator = Paginator::new(
            config.collection.pagination_enabled,
            config.collection.pagination_limit,
        );
        Ok(Self::new(client, paginator, config.collection.clone()))
    }

    /// Queries a cycle starting at `now` would issue
    pub fn queries(&self, now: DateTime<Utc>) -> CycleQueries {
        CycleQueries::at(now, &self.config)
    }

    /// 전체 리소스 수집
    ///
    /// Runs every gateway concurrently. The first failure cancels the rest
    /// and fails the cycle.
    #[instrument(skip(self))]
    pub async fn collect(&self, now: DateTime<Utc>) -> Result<Collections, CycleError> {
        let queries = self.queries(now);

        let (
            deployments,
            flows,
            recent_flow_runs,
            active_flow_runs,
            failed_flow_runs,
            work_pools,
            work_queues,
        ) = tokio::try_join!(
            self.fetch(&queries.deployments),
            self.fetch(&queries.flows),
            self.fetch(&queries.recent_flow_runs),
            self.fetch(&queries.active_flow_runs),
            self.fetch(&queries.failed_flow_runs),
            self.fetch(&queries.work_pools),
            self.fetch(&queries.work_queues),
        )?;

        let collections = Collections {
            deployments,
            flows,
            recent_flow_runs,
            active_flow_runs,
            failed_flow_runs,
            work_pools,
            work_queues,
        };

        debug!(
            deployments = collections.deployments.len(),
            flows = collections.flows.len(),
            flow_runs = collections.active_flow_runs.len(),
            work_pools = collections.work_pools.len(),
            work_queues = collections.work_queues.len(),
            "Collection cycle fetched"
        );

        Ok(collections)
    }

    /// 클라이언트 참조 반환
    pub fn client(&self) -> &PrefectClient {
        &self.client
    }

    async fn fetch<T: DeserializeOwned>(&self, gateway: &Gateway) -> Result<Vec<T>, CycleError> {
        let decode = |items: Vec<serde_json::Value>| -> CollectResult<Vec<T>> {
            items
                .into_iter()
                .map(|item| {
                    serde_json::from_value(item)
                        .map_err(|e| CollectorError::decode(&gateway.endpoint(), e))
                })
                .collect()
        };

        self.paginator
            .collect_all(&self.client, gateway)
            .await
            .and_then(decode)
            .map_err(CycleError::fetch(gateway.name()))
    }
}
