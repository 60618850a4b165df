//! Offset pagination over `*/filter` endpoints

use serde_json::Value;
use std::future::Future;
use tracing::debug;

use super::client::{ApiRequest, PrefectClient};
use super::gateway::Gateway;
use super::CollectResult;
use crate::error::CollectorError;

/// Page size used when none is configured
pub const DEFAULT_PAGE_LIMIT: usize = 200;

/// Offset paginator
///
/// Requests pages at `offset = k * limit` until one comes back empty. With
/// pagination disabled exactly one page is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    enabled: bool,
    limit: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(true, DEFAULT_PAGE_LIMIT)
    }
}

impl Paginator {
    /// Create a paginator; a zero limit falls back to the default page size
    pub fn new(enabled: bool, limit: usize) -> Self {
        let limit = if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit };
        Self { enabled, limit }
    }

    /// Page size
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Fetch every page of `gateway`, preserving upstream order
    pub async fn collect_all(
        &self,
        client: &PrefectClient,
        gateway: &Gateway,
    ) -> CollectResult<Vec<Value>> {
        let endpoint = gateway.endpoint();
        let endpoint = endpoint.as_str();
        let limit = self.limit;

        let items = self
            .collect_with(move |offset| {
                let request = ApiRequest::post(endpoint, gateway.page_body(limit, offset));
                async move {
                    match client.fetch(&request).await? {
                        Value::Array(page) => Ok(page),
                        other => Err(CollectorError::decode(
                            endpoint,
                            format!("expected a JSON array, got {}", json_kind(&other)),
                        )),
                    }
                }
            })
            .await?;

        debug!(gateway = gateway.name(), count = items.len(), "Collected resource");
        Ok(items)
    }

    /// Drive `fetch_page(offset)` until the termination condition holds
    pub async fn collect_with<F, Fut, T>(&self, mut fetch_page: F) -> CollectResult<Vec<T>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = CollectResult<Vec<T>>>,
    {
        let mut items = Vec::new();
        let mut offset = 0;

        loop {
            let page = fetch_page(offset).await?;
            debug!(offset, size = page.len(), "Fetched page");

            if page.is_empty() {
                break;
            }
            items.extend(page);

            if !self.enabled {
                break;
            }
            offset += self.limit;
        }

        Ok(items)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serve pages of the given sizes, recording every requested offset
    async fn run(paginator: Paginator, sizes: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let offsets = Mutex::new(Vec::new());
        let offsets_ref = &offsets;

        let items = paginator
            .collect_with(|offset| {
                let call = {
                    let mut seen = offsets_ref.lock().unwrap();
                    seen.push(offset);
                    seen.len() - 1
                };
                let size = sizes.get(call).copied().unwrap_or(0);
                async move { Ok((0..size).map(|i| offset + i).collect::<Vec<_>>()) }
            })
            .await
            .unwrap();

        (offsets.into_inner().unwrap(), items)
    }

    #[tokio::test]
    async fn test_follows_pages_until_empty() {
        let (offsets, items) = run(Paginator::new(true, 200), &[200, 200, 150, 0]).await;

        assert_eq!(offsets, vec![0, 200, 400, 600]);
        assert_eq!(items.len(), 550);
        assert_eq!(items[0], 0);
        assert_eq!(items[549], 549);
    }

    #[tokio::test]
    async fn test_short_page_does_not_stop_pagination() {
        let (offsets, items) = run(Paginator::new(true, 10), &[3, 0]).await;
        assert_eq!(offsets, vec![0, 10]);
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_disabled_fetches_exactly_one_page() {
        let (offsets, items) = run(Paginator::new(false, 200), &[200, 200, 150]).await;
        assert_eq!(offsets, vec![0]);
        assert_eq!(items.len(), 200);
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let (offsets, items) = run(Paginator::default(), &[]).await;
        assert_eq!(offsets, vec![0]);
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_page_error_propagates() {
        let result: CollectResult<Vec<u8>> = Paginator::default()
            .collect_with(|_| async { Err(CollectorError::HttpStatus(500)) })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_limit_falls_back_to_default() {
        assert_eq!(Paginator::new(true, 0).limit(), DEFAULT_PAGE_LIMIT);
    }
}
