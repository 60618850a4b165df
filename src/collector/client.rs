//! Prefect HTTP 클라이언트
//!
//! Connection pooling, 인증 헤더, CSRF 토큰, 고정 횟수 재시도를 지원하는
//! 비동기 HTTP 클라이언트입니다.

use chrono::Utc;
use reqwest::{header, Client, ClientBuilder, Method, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::token::{AuthToken, TokenCache};
use super::CollectResult;
use crate::config::PrefectConfig;
use crate::error::CollectorError;

/// Header carrying the CSRF token value
pub const CSRF_TOKEN_HEADER: &str = "Prefect-Csrf-Token";
/// Header carrying the CSRF client identifier
pub const CSRF_CLIENT_HEADER: &str = "Prefect-Csrf-Client";

/// API 요청 기술자
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the API base URL (e.g. `flows/filter`)
    pub path: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// Optional JSON body
    pub body: Option<Value>,
}

impl ApiRequest {
    /// GET 요청 생성
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// JSON 본문이 있는 POST 요청 생성
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// 쿼리 파라미터 추가
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// 재시도 설정
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 요청당 최대 시도 횟수
    pub max_retries: u32,
    /// 초기 지연 시간 (0이면 즉시 재시도)
    pub initial_delay: Duration,
    /// 최대 지연 시간
    pub max_delay: Duration,
    /// 지연 시간 증가 배수
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    Basic { username: String, password: String },
}

#[derive(Debug)]
struct Csrf {
    client_id: String,
    cache: TokenCache,
}

/// Prefect HTTP 클라이언트
#[derive(Clone)]
pub struct PrefectClient {
    client: Client,
    base_url: Url,
    auth: Option<Auth>,
    retry: RetryConfig,
    csrf: Option<Arc<Csrf>>,
}

impl PrefectClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `base_url` - Prefect API URL (예: "http://localhost:4200/api")
    /// * `timeout_ms` - 요청 타임아웃 (밀리초)
    pub fn new(base_url: &str, timeout_ms: u64) -> CollectResult<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(CollectorError::HttpClientInit)?;

        // Url::join replaces the last segment unless the base ends with '/'
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|source| CollectorError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        Ok(Self {
            client,
            base_url,
            auth: None,
            retry: RetryConfig::default(),
            csrf: None,
        })
    }

    /// 설정으로부터 클라이언트 생성
    pub fn from_config(config: &PrefectConfig) -> CollectResult<Self> {
        let mut client = Self::new(&config.url, config.timeout_ms)?.with_retry(RetryConfig {
            max_retries: config.max_retries,
            initial_delay: config.retry_delay(),
            ..RetryConfig::default()
        });

        if let Some(ref api_key) = config.api_key {
            client = client.with_bearer(api_key);
        } else if let (Some(ref username), Some(ref password)) =
            (&config.username, &config.password)
        {
            client = client.with_basic_auth(username, password);
        }

        if config.csrf_enabled {
            let client_id = config
                .client_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            client = client.with_csrf(&client_id);
        }

        Ok(client)
    }

    /// Bearer 토큰 인증 설정
    pub fn with_bearer(mut self, api_key: &str) -> Self {
        self.auth = Some(Auth::Bearer(api_key.to_string()));
        self
    }

    /// Basic Auth 설정
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.auth = Some(Auth::Basic {
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    /// 재시도 정책 설정
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// CSRF 토큰 헤더 활성화
    pub fn with_csrf(mut self, client_id: &str) -> Self {
        self.csrf = Some(Arc::new(Csrf {
            client_id: client_id.to_string(),
            cache: TokenCache::new(),
        }));
        self
    }

    /// API base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// CSRF client id, when CSRF headers are enabled
    pub fn csrf_client_id(&self) -> Option<&str> {
        self.csrf.as_deref().map(|c| c.client_id.as_str())
    }

    /// 재시도 정책에 따라 단일 API 호출 수행
    ///
    /// Retries transport failures and non-2xx statuses up to `max_retries`
    /// attempts in total, then fails with [`CollectorError::MaxRetriesExceeded`].
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn fetch(&self, request: &ApiRequest) -> CollectResult<Value> {
        match self.csrf.as_deref() {
            Some(csrf) => {
                let token = self.csrf_token(csrf).await?;
                let headers = (csrf.client_id.as_str(), token.value.as_str());
                self.send_with_retry(request, Some(headers)).await
            }
            None => self.send_with_retry(request, None).await,
        }
    }

    /// Prefect 헬스 체크
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> CollectResult<()> {
        let body = self.fetch(&ApiRequest::get("health")).await?;
        info!(url = %self.base_url, response = %body, "Prefect health check passed");
        Ok(())
    }

    /// Prefect 서버 버전 조회
    #[instrument(skip(self))]
    pub async fn server_version(&self) -> CollectResult<String> {
        match self.fetch(&ApiRequest::get("admin/version")).await? {
            Value::String(version) => Ok(version),
            other => Err(CollectorError::decode(
                "admin/version",
                format!("expected a version string, got {}", other),
            )),
        }
    }

    async fn csrf_token(&self, csrf: &Csrf) -> CollectResult<AuthToken> {
        csrf.cache
            .get_valid_token(Utc::now(), move || async move {
                let request = ApiRequest::get("csrf-token").with_query("client", &csrf.client_id);
                let body = self.send_with_retry(&request, None).await?;
                serde_json::from_value(body).map_err(|e| CollectorError::InvalidToken(e.to_string()))
            })
            .await
    }

    async fn send_with_retry(
        &self,
        request: &ApiRequest,
        csrf: Option<(&str, &str)>,
    ) -> CollectResult<Value> {
        let max_attempts = self.retry.max_retries.max(1);
        let mut delay = self.retry.initial_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match self.send_once(request, csrf).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!(path = %request.path, error = %err, "Request failed, not retryable");
                return Err(err);
            }

            if attempt >= max_attempts {
                error!(
                    path = %request.path,
                    attempts = attempt,
                    error = %err,
                    "Request failed, giving up"
                );
                return Err(CollectorError::MaxRetriesExceeded {
                    path: request.path.clone(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            warn!(
                attempt,
                max = max_attempts,
                path = %request.path,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Request failed, retrying"
            );

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(
                    Duration::from_secs_f64(delay.as_secs_f64() * self.retry.multiplier),
                    self.retry.max_delay,
                );
            }
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        csrf: Option<(&str, &str)>,
    ) -> CollectResult<Value> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|source| CollectorError::InvalidUrl {
                url: request.path.clone(),
                source,
            })?;

        let mut req = self
            .client
            .request(request.method.clone(), url)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json");

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(ref body) = request.body {
            req = req.json(body);
        }
        req = self.authorize(req);
        if let Some((client_id, token)) = csrf {
            req = req
                .header(CSRF_TOKEN_HEADER, token)
                .header(CSRF_CLIENT_HEADER, client_id);
        }

        debug!("Sending Prefect API request");

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(CollectorError::HttpResponse)?;

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| CollectorError::decode(&request.path, e))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(Auth::Bearer(key)) => req.bearer_auth(key),
            Some(Auth::Basic { username, password }) => req.basic_auth(username, Some(password)),
            None => req,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_new() {
        let client = PrefectClient::new("http://localhost:4200/api", 5000).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:4200/api/");
        assert!(client.auth.is_none());
        assert!(client.csrf_client_id().is_none());
    }

    #[test]
    fn test_client_trailing_slash_normalized() {
        let client = PrefectClient::new("http://localhost:4200/api///", 5000).unwrap();
        let joined = client.base_url().join("flows/filter").unwrap();
        assert_eq!(joined.as_str(), "http://localhost:4200/api/flows/filter");
    }

    #[test]
    fn test_client_invalid_url() {
        let result = PrefectClient::new("not a url", 5000);
        assert!(matches!(result, Err(CollectorError::InvalidUrl { .. })));
    }

    #[test]
    fn test_client_with_auth() {
        let client = PrefectClient::new("http://localhost:4200/api", 5000)
            .unwrap()
            .with_basic_auth("user", "pass");
        assert!(matches!(client.auth, Some(Auth::Basic { .. })));
    }

    #[test]
    fn test_from_config_generates_client_id() {
        let config = PrefectConfig {
            csrf_enabled: true,
            api_key: Some("pnu_key".to_string()),
            ..PrefectConfig::default()
        };
        let client = PrefectClient::from_config(&config).unwrap();

        let client_id = client.csrf_client_id().unwrap();
        assert!(Uuid::parse_str(client_id).is_ok());
        assert!(matches!(client.auth, Some(Auth::Bearer(_))));
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::ZERO);
    }

    #[test]
    fn test_api_request_builders() {
        let get = ApiRequest::get("csrf-token").with_query("client", "abc");
        assert_eq!(get.method, Method::GET);
        assert_eq!(get.query, vec![("client".to_string(), "abc".to_string())]);
        assert!(get.body.is_none());

        let post = ApiRequest::post("flows/filter", serde_json::json!({"limit": 1}));
        assert_eq!(post.method, Method::POST);
        assert!(post.body.is_some());
    }
}
