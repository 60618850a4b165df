//! CSRF 토큰 캐시
//!
//! Prefect servers with CSRF protection enabled require a short-lived token
//! on every request. The cache hands out the stored token until it expires
//! and refreshes it exactly once per expiry, even under concurrent callers.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

use super::CollectResult;

/// A CSRF token and its expiry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthToken {
    /// Token value
    #[serde(rename = "token")]
    pub value: String,
    /// Instant after which the server rejects the token
    pub expiration: DateTime<Utc>,
}

impl AuthToken {
    /// Whether the token is no longer valid at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }
}

/// Single-slot token cache
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<AuthToken>>,
}

impl TokenCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, calling `fetch` when it is missing or expired
    ///
    /// The slot stays locked while `fetch` runs, so concurrent callers wait
    /// for the one in-flight refresh instead of issuing their own.
    pub async fn get_valid_token<F, Fut>(
        &self,
        now: DateTime<Utc>,
        fetch: F,
    ) -> CollectResult<AuthToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CollectResult<AuthToken>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(token) = slot.as_ref() {
            if !token.is_expired(now) {
                return Ok(token.clone());
            }
            debug!(expiration = %token.expiration, "CSRF token expired");
        }

        let token = fetch().await?;
        debug!(expiration = %token.expiration, "CSRF token refreshed");
        *slot = Some(token.clone());

        Ok(token)
    }

    /// Currently cached token, if any
    pub async fn cached(&self) -> Option<AuthToken> {
        self.slot.lock().await.clone()
    }
}
