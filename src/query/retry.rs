//! The fetch task: runs a registered fetcher with backoff and settles the
//! result into the cache.

use std::sync::Arc;

use futures::FutureExt;

use super::cache::{ErasedFetcher, FetchResult, InFlight, QueryCache};
use super::config::RetryPolicy;
use super::error::QueryError;
use super::key::QueryKey;
use super::notify::{ErrorNotifier, Operation};

/// Spawns the fetch for `fetch_id` and returns its shared result.
///
/// The task outlives every waiter, so a fetch nobody awaits anymore still
/// lands in the cache (unless the entry was removed meanwhile).
pub(crate) fn spawn_fetch(
    cache: Arc<QueryCache>,
    notifier: ErrorNotifier,
    key: QueryKey,
    fetch_id: u64,
    fetcher: ErasedFetcher,
    retry: RetryPolicy,
) -> InFlight {
    let handle = tokio::spawn(run(cache, notifier, key, fetch_id, fetcher, retry));
    async move {
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(QueryError::FetchError(format!("fetch task failed: {err}"))),
        }
    }
    .boxed()
    .shared()
}

async fn run(
    cache: Arc<QueryCache>,
    notifier: ErrorNotifier,
    key: QueryKey,
    fetch_id: u64,
    fetcher: ErasedFetcher,
    retry: RetryPolicy,
) -> FetchResult {
    let result = with_retry(&cache, &key, fetch_id, &fetcher, retry).await;

    if cache.settle(&key, fetch_id, &result) {
        if let Err(err) = &result {
            tracing::warn!(%key, error = %err, "query failed");
            notifier.report(Operation::Query, err);
        }
    }
    result
}

async fn with_retry(
    cache: &QueryCache,
    key: &QueryKey,
    fetch_id: u64,
    fetcher: &ErasedFetcher,
    retry: RetryPolicy,
) -> FetchResult {
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(data) => return Ok(data),
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                attempt += 1;
                cache.record_failure(key, fetch_id, attempt);
                tracing::debug!(%key, attempt, ?delay, error = %err, "retrying query");
                tokio::time::sleep(delay).await;
                if !cache.is_current(key, fetch_id) {
                    // Removed while backing off; the result is discarded anyway.
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}
