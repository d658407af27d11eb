//! The catalog port consumed by the core, and its retry policy.

use std::future::Future;

use async_trait::async_trait;
use tracing::warn;

use super::ApiError;
use crate::error::SyncError;
use crate::models::Study;

/// Total attempts (first try included) for every gateway call.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Remote source of catalog studies.
///
/// Implementations may fail transiently at any time, including right after
/// construction; the core never assumes the gateway is reachable.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// One page of studies.
    async fn fetch_page(&self, page_size: usize) -> Result<Vec<Study>, ApiError>;

    /// A single study. Missing studies are `ApiError::NotFound`.
    async fn fetch_by_id(&self, id: &str) -> Result<Study, ApiError>;

    /// Up to `max_ids` known study ids.
    async fn fetch_id_pool(&self, max_ids: usize) -> Result<Vec<String>, ApiError>;
}

/// Run `op` up to `attempts` times, retrying immediately on transient
/// failures only. The final error is classified into a [`SyncError`].
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    attempts: u32,
    id: Option<&str>,
    mut op: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(operation, attempt, error = %e, "Catalog request failed, retrying");
            }
            Err(e) => return Err(SyncError::from_api(e, attempt, id)),
        }
    }
}
