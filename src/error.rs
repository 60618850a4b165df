//! Error types for prefect-exporter
//!
//! This module defines the error types used throughout the application.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Collector error
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Collection cycle error
    #[error("Cycle error: {0}")]
    Cycle(#[from] CycleError),

    /// No successful cycle has completed yet
    #[error("No metrics snapshot available")]
    NoSnapshot,
}

/// Collector 모듈 에러 타입
#[derive(Error, Debug)]
pub enum CollectorError {
    /// HTTP 클라이언트 초기화 실패
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(#[source] reqwest::Error),

    /// 잘못된 API URL
    #[error("Invalid API URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// HTTP 요청 실패
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[source] reqwest::Error),

    /// HTTP 응답 읽기 실패
    #[error("Failed to read HTTP response: {0}")]
    HttpResponse(#[source] reqwest::Error),

    /// HTTP 상태 코드 에러
    #[error("HTTP error status: {0}")]
    HttpStatus(u16),

    /// 타임아웃
    #[error("Request timed out")]
    Timeout,

    /// 연결 실패
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// JSON 디코딩 에러
    #[error("Failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },

    /// CSRF 토큰 응답 이상
    #[error("Invalid CSRF token response: {0}")]
    InvalidToken(String),

    /// 최대 재시도 초과
    #[error("Giving up on {path} after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        path: String,
        attempts: u32,
        #[source]
        source: Box<CollectorError>,
    },
}

impl CollectorError {
    /// 재시도 가능한 에러인지 확인
    ///
    /// Every transport failure and every non-2xx status is retried. Decode
    /// errors are deterministic for a given body and fail immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollectorError::HttpRequest(_)
                | CollectorError::HttpResponse(_)
                | CollectorError::HttpStatus(_)
                | CollectorError::Timeout
                | CollectorError::ConnectionFailed(_)
        )
    }

    /// HTTP 상태 코드 추출
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CollectorError::HttpStatus(code) => Some(*code),
            CollectorError::MaxRetriesExceeded { source, .. } => source.http_status(),
            _ => None,
        }
    }

    pub(crate) fn decode(path: &str, message: impl std::fmt::Display) -> Self {
        CollectorError::Decode {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for CollectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CollectorError::Timeout
        } else if err.is_connect() {
            CollectorError::ConnectionFailed(err.to_string())
        } else if err.is_request() {
            CollectorError::HttpRequest(err)
        } else {
            CollectorError::HttpResponse(err)
        }
    }
}

/// A scrape cycle that could not produce a complete snapshot
#[derive(Error, Debug)]
pub enum CycleError {
    /// A gateway fetch failed after exhausting its retries
    #[error("Failed to fetch {resource}: {source}")]
    Fetch {
        resource: &'static str,
        #[source]
        source: CollectorError,
    },
}

impl CycleError {
    pub(crate) fn fetch(resource: &'static str) -> impl FnOnce(CollectorError) -> Self {
        move |source| CycleError::Fetch { resource, source }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, public_message, log_message) = match self {
            AppError::Config(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error",
                e.to_string(),
            ),
            AppError::Collector(e) => (StatusCode::BAD_GATEWAY, "Upstream error", e.to_string()),
            AppError::Cycle(e) => (StatusCode::BAD_GATEWAY, "Collection failed", e.to_string()),
            AppError::NoSnapshot => (
                StatusCode::SERVICE_UNAVAILABLE,
                "No metrics available yet",
                "no successful cycle".to_string(),
            ),
        };

        tracing::error!(status = %status, error = %log_message, "Request failed");

        (status, public_message).into_response()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;
