pub mod hcloud;

use crate::errors::ProviderError;
use crate::model::{PriceEntry, Resource, ResourceKind};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

pub use hcloud::HcloudClient;

/// Cloud provider inventory and price list, as consumed by the collectors.
#[async_trait]
pub trait Provider: Send + Sync {
    /// every billable resource of one kind, in provider order.
    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<Resource>, ProviderError>;

    /// the complete current price list.
    async fn price_list(&self) -> Result<Vec<PriceEntry>, ProviderError>;
}

/// Bound a provider call by `limit`; expiry drops the in-flight request.
pub async fn with_timeout<T, F>(
    endpoint: &str,
    limit: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            endpoint: endpoint.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
