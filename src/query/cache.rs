//! Keyed store of query entries.
//!
//! The cache owns every [`CacheEntry`]: data, status, timestamps, subscriber
//! count, the in-flight fetch and the garbage-collection timer. It performs
//! no I/O itself. Fetches are started by [`QueryClient`](super::QueryClient),
//! which hands the cache a spawn function so that registering the in-flight
//! fetch and flipping the status to `Pending` happen under one entry lock.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::{INFINITE, QueryConfig, RetryPolicy};
use super::error::QueryError;
use super::key::QueryKey;

pub(crate) type AnyData = Arc<dyn Any + Send + Sync>;
pub(crate) type FetchResult = Result<AnyData, QueryError>;
pub(crate) type ErasedFetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;
pub(crate) type InFlight = Shared<BoxFuture<'static, FetchResult>>;

/// Lifecycle of a query entry.
///
/// `Idle -> Pending -> Success | Error`, and back to `Pending` on refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// Created but never fetched (or disabled).
    Idle,
    /// A fetch is in flight. Previously fetched data is kept meanwhile.
    Pending,
    Success,
    Error,
}

/// Change notifications broadcast by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Data, status or fetch state of the entry changed.
    Updated(QueryKey),
    /// The entry was marked stale.
    Invalidated(QueryKey),
    /// The entry was deleted (explicit removal or garbage collection).
    Removed(QueryKey),
}

impl CacheEvent {
    pub const fn key(&self) -> &QueryKey {
        match self {
            Self::Updated(key) | Self::Invalidated(key) | Self::Removed(key) => key,
        }
    }
}

/// Read-only view of an entry, detached from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub error: Option<QueryError>,
    pub has_data: bool,
    /// When data was last fetched successfully (or set directly).
    pub updated_at: Option<Instant>,
    pub error_updated_at: Option<Instant>,
    pub is_stale: bool,
    pub is_fetching: bool,
    pub is_invalidated: bool,
    pub subscriber_count: usize,
    /// Consecutive failed attempts of the current or last fetch.
    pub failure_count: u32,
    pub stale_time: Duration,
    pub gc_time: Duration,
}

struct GcTimer {
    generation: u64,
    token: CancellationToken,
}

struct Fetch {
    id: u64,
    /// `invalidations` of the entry when the fetch started.
    epoch: u64,
    future: InFlight,
}

/// A cached query.
struct CacheEntry {
    data: Option<AnyData>,
    error: Option<QueryError>,
    status: QueryStatus,
    updated_at: Option<Instant>,
    error_updated_at: Option<Instant>,
    invalidated: bool,
    invalidations: u64,
    subscriber_count: usize,
    failure_count: u32,
    config: QueryConfig,
    fetcher: Option<ErasedFetcher>,
    in_flight: Option<Fetch>,
    gc: Option<GcTimer>,
}

impl CacheEntry {
    fn new(config: QueryConfig) -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Idle,
            updated_at: None,
            error_updated_at: None,
            invalidated: false,
            invalidations: 0,
            subscriber_count: 0,
            failure_count: 0,
            config,
            fetcher: None,
            in_flight: None,
            gc: None,
        }
    }

    /// Checks if this entry is stale based on its stale time.
    fn is_stale(&self, now: Instant) -> bool {
        if self.invalidated || self.data.is_none() {
            return true;
        }
        self.updated_at
            .is_none_or(|at| now.saturating_duration_since(at) >= self.config.stale_time)
    }

    fn cancel_gc(&mut self) {
        if let Some(timer) = self.gc.take() {
            timer.token.cancel();
        }
    }

    fn snapshot(&self, key: &QueryKey, now: Instant) -> EntrySnapshot {
        EntrySnapshot {
            key: key.clone(),
            status: self.status,
            error: self.error.clone(),
            has_data: self.data.is_some(),
            updated_at: self.updated_at,
            error_updated_at: self.error_updated_at,
            is_stale: self.is_stale(now),
            is_fetching: self.in_flight.is_some(),
            is_invalidated: self.invalidated,
            subscriber_count: self.subscriber_count,
            failure_count: self.failure_count,
            stale_time: self.config.stale_time,
            gc_time: self.config.gc_time,
        }
    }
}

/// The keyed entry store shared by a [`QueryClient`](super::QueryClient).
pub struct QueryCache {
    entries: DashMap<QueryKey, CacheEntry>,
    events: broadcast::Sender<CacheEvent>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            entries: DashMap::new(),
            events,
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes to change notifications for all keys.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        let now = Instant::now();
        self.entries.get(key).map(|entry| entry.snapshot(key, now))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys matching `prefix`, in no particular order.
    pub fn find_all(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        self.entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub(crate) fn view(&self, key: &QueryKey) -> Option<(EntrySnapshot, Option<AnyData>)> {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|entry| (entry.snapshot(key, now), entry.data.clone()))
    }

    pub(crate) fn data(&self, key: &QueryKey) -> Option<AnyData> {
        self.entries.get(key).and_then(|entry| entry.data.clone())
    }

    /// Fresh data for `key`, if any.
    pub(crate) fn fresh_data(&self, key: &QueryKey) -> Option<AnyData> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_stale(now))
            .and_then(|entry| entry.data.clone())
    }

    pub(crate) fn is_fetching(&self, key: &QueryKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Creates the entry if missing and refreshes its options and fetcher.
    pub(crate) fn ensure(&self, key: &QueryKey, config: QueryConfig, fetcher: Option<ErasedFetcher>) {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(config.clone()));
        entry.config = config;
        if fetcher.is_some() {
            entry.fetcher = fetcher;
        }
    }

    /// Attaches a subscriber: the entry is created if missing and its
    /// garbage-collection timer is cancelled.
    pub(crate) fn acquire(&self, key: &QueryKey, config: QueryConfig, fetcher: Option<ErasedFetcher>) {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(config.clone()));
        entry.config = config;
        if fetcher.is_some() {
            entry.fetcher = fetcher;
        }
        entry.subscriber_count += 1;
        entry.cancel_gc();
        tracing::trace!(%key, subscribers = entry.subscriber_count, "subscriber attached");
    }

    /// Detaches a subscriber; the last one starts the garbage-collection timer.
    pub(crate) fn release(self: &Arc<Self>, key: &QueryKey) {
        let idle = match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
                tracing::trace!(%key, subscribers = entry.subscriber_count, "subscriber detached");
                entry.subscriber_count == 0
            }
            None => false,
        };
        if idle {
            self.schedule_gc(key);
        }
    }

    /// Whether the entry has subscribers and is enabled, i.e. should be
    /// refetched eagerly when invalidated.
    pub(crate) fn is_active(&self, key: &QueryKey) -> bool {
        self.entries.get(key).is_some_and(|entry| {
            entry.subscriber_count > 0 && entry.config.enabled && entry.fetcher.is_some()
        })
    }

    /// Whether a new subscriber should trigger a fetch.
    pub(crate) fn needs_fetch(&self, key: &QueryKey) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| entry.config.enabled && entry.is_stale(now))
    }

    /// Stale entries with subscribers whose options accept `trigger`.
    pub(crate) fn active_stale_keys(&self, trigger: impl Fn(&QueryConfig) -> bool) -> Vec<QueryKey> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| {
                entry.subscriber_count > 0
                    && entry.config.enabled
                    && entry.fetcher.is_some()
                    && trigger(&entry.config)
                    && entry.is_stale(now)
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Overwrites the data of `key` without a network call.
    pub(crate) fn set_data(self: &Arc<Self>, key: &QueryKey, data: AnyData, config: &QueryConfig) {
        let idle = {
            let mut entry = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(config.clone()));
            entry.data = Some(data);
            entry.error = None;
            entry.status = QueryStatus::Success;
            entry.updated_at = Some(Instant::now());
            entry.invalidated = false;
            entry.subscriber_count == 0
        };
        tracing::debug!(%key, "query data set");
        let _ = self.events.send(CacheEvent::Updated(key.clone()));
        if idle {
            self.schedule_gc(key);
        }
    }

    /// Marks every entry matching `prefix` stale. Returns the matched keys.
    pub(crate) fn invalidate(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut keys = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if entry.key().starts_with(prefix) {
                entry.invalidated = true;
                entry.invalidations += 1;
                keys.push(entry.key().clone());
            }
        }
        tracing::debug!(%prefix, matched = keys.len(), "queries invalidated");
        for key in &keys {
            let _ = self.events.send(CacheEvent::Invalidated(key.clone()));
        }
        keys
    }

    /// Deletes every entry matching `prefix`, whatever its subscriber count.
    pub(crate) fn remove(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let keys = self.find_all(prefix);
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((key, mut entry)) = self.entries.remove(&key) {
                entry.cancel_gc();
                removed.push(key);
            }
        }
        tracing::debug!(%prefix, removed = removed.len(), "queries removed");
        for key in &removed {
            let _ = self.events.send(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    /// Drops every entry and cancels all timers.
    pub(crate) fn clear(&self) {
        self.remove(&QueryKey::new());
    }

    /// Starts a fetch for `key`, or joins the one already in flight.
    ///
    /// `spawn` receives a fresh fetch id, the fetcher and the retry policy,
    /// and must return the shared in-flight future. `fetcher` overrides the
    /// registered fetcher for this fetch only. Returns `None` when the entry
    /// is missing or has no fetcher.
    pub(crate) fn begin_fetch<F>(
        &self,
        key: &QueryKey,
        fetcher: Option<ErasedFetcher>,
        spawn: F,
    ) -> Option<InFlight>
    where
        F: FnOnce(u64, ErasedFetcher, RetryPolicy) -> InFlight,
    {
        let in_flight = {
            let mut entry = self.entries.get_mut(key)?;
            if let Some(fetch) = &entry.in_flight {
                tracing::trace!(%key, "joining in-flight fetch");
                return Some(fetch.future.clone());
            }
            let fetcher = fetcher.or_else(|| entry.fetcher.clone())?;
            let fetch_id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let in_flight = spawn(fetch_id, fetcher, entry.config.retry);
            entry.in_flight = Some(Fetch {
                id: fetch_id,
                epoch: entry.invalidations,
                future: in_flight.clone(),
            });
            entry.status = QueryStatus::Pending;
            entry.failure_count = 0;
            tracing::debug!(%key, fetch_id, "fetch started");
            in_flight
        };
        let _ = self.events.send(CacheEvent::Updated(key.clone()));
        Some(in_flight)
    }

    /// Whether `fetch_id` is still the in-flight fetch of `key`.
    pub(crate) fn is_current(&self, key: &QueryKey, fetch_id: u64) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.in_flight.as_ref().is_some_and(|f| f.id == fetch_id))
    }

    pub(crate) fn record_failure(&self, key: &QueryKey, fetch_id: u64, failure_count: u32) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.in_flight.as_ref().is_some_and(|f| f.id == fetch_id) {
                entry.failure_count = failure_count;
            }
        }
    }

    /// Stores the outcome of fetch `fetch_id`.
    ///
    /// Returns `false` (and discards the result) when the entry was removed
    /// or the fetch is no longer the current one. Data from a fetch that
    /// started before the latest invalidation is stored but stays stale.
    pub(crate) fn settle(self: &Arc<Self>, key: &QueryKey, fetch_id: u64, result: &FetchResult) -> bool {
        let idle = {
            let Some(mut entry) = self.entries.get_mut(key) else {
                tracing::debug!(%key, fetch_id, "discarding result of removed query");
                return false;
            };
            let Some(epoch) = entry
                .in_flight
                .as_ref()
                .filter(|f| f.id == fetch_id)
                .map(|f| f.epoch)
            else {
                tracing::debug!(%key, fetch_id, "discarding result of superseded fetch");
                return false;
            };
            entry.in_flight = None;
            let invalidated_since = entry.invalidations != epoch;
            let now = Instant::now();
            match result {
                Ok(data) => {
                    entry.data = Some(data.clone());
                    entry.error = None;
                    entry.status = QueryStatus::Success;
                    entry.updated_at = Some(now);
                    entry.invalidated = invalidated_since;
                    entry.failure_count = 0;
                }
                Err(err) => {
                    entry.error = Some(err.clone());
                    entry.status = QueryStatus::Error;
                    entry.error_updated_at = Some(now);
                    entry.failure_count += 1;
                }
            }
            tracing::debug!(%key, fetch_id, ok = result.is_ok(), "fetch settled");
            entry.subscriber_count == 0
        };
        let _ = self.events.send(CacheEvent::Updated(key.clone()));
        if idle {
            self.schedule_gc(key);
        }
        true
    }

    fn schedule_gc(self: &Arc<Self>, key: &QueryKey) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::trace!(%key, "no runtime, garbage collection not scheduled");
            return;
        };
        let (generation, token, gc_time) = {
            let Some(mut entry) = self.entries.get_mut(key) else {
                return;
            };
            entry.cancel_gc();
            if entry.config.gc_time == INFINITE {
                return;
            }
            let generation = self.next_id.fetch_add(1, Ordering::Relaxed);
            let token = CancellationToken::new();
            entry.gc = Some(GcTimer {
                generation,
                token: token.clone(),
            });
            (generation, token, entry.config.gc_time)
        };

        let cache: Weak<Self> = Arc::downgrade(self);
        let key = key.clone();
        runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(gc_time) => {
                    if let Some(cache) = cache.upgrade() {
                        cache.collect(&key, generation);
                    }
                }
            }
        });
    }

    fn collect(&self, key: &QueryKey, generation: u64) {
        let removed = self.entries.remove_if(key, |_, entry| {
            entry.subscriber_count == 0
                && entry.in_flight.is_none()
                && entry.gc.as_ref().is_some_and(|gc| gc.generation == generation)
        });
        if removed.is_some() {
            tracing::debug!(%key, "query garbage collected");
            let _ = self.events.send(CacheEvent::Removed(key.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;
    use futures::FutureExt;

    fn erased(value: i32) -> ErasedFetcher {
        Arc::new(move || async move { Ok(Arc::new(value) as AnyData) }.boxed())
    }

    fn ready(result: FetchResult) -> InFlight {
        async move { result }.boxed().shared()
    }

    fn cache_with(key: &QueryKey, config: QueryConfig) -> Arc<QueryCache> {
        let cache = Arc::new(QueryCache::new());
        cache.ensure(key, config, Some(erased(1)));
        cache
    }

    #[test]
    fn test_new_entry_is_idle_and_stale() {
        let key = query_key!["staff"];
        let cache = cache_with(&key, QueryConfig::default());

        let snapshot = cache.get(&key).expect("entry");
        assert_eq!(snapshot.status, QueryStatus::Idle);
        assert!(snapshot.is_stale);
        assert!(!snapshot.has_data);
        assert_eq!(snapshot.subscriber_count, 0);
    }

    #[tokio::test]
    async fn test_begin_fetch_is_deduplicated() {
        let key = query_key!["staff"];
        let cache = cache_with(&key, QueryConfig::default());
        let mut spawned = 0;

        let first = cache.begin_fetch(&key, None, |_, _, _| {
            spawned += 1;
            ready(Ok(Arc::new(1) as AnyData))
        });
        let second = cache.begin_fetch(&key, None, |_, _, _| {
            spawned += 1;
            ready(Ok(Arc::new(2) as AnyData))
        });

        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(spawned, 1);
        assert_eq!(cache.get(&key).map(|s| s.status), Some(QueryStatus::Pending));
    }

    #[tokio::test]
    async fn test_settle_success_and_error() {
        let key = query_key!["staff"];
        let cache = cache_with(&key, QueryConfig::new(Duration::from_secs(60), INFINITE));

        let mut fetch_id = 0;
        cache.begin_fetch(&key, None, |id, _, _| {
            fetch_id = id;
            ready(Ok(Arc::new(4) as AnyData))
        });
        assert!(cache.settle(&key, fetch_id, &Ok(Arc::new(4) as AnyData)));

        let snapshot = cache.get(&key).expect("entry");
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert!(!snapshot.is_stale);
        assert!(!snapshot.is_fetching);

        cache.begin_fetch(&key, None, |id, _, _| {
            fetch_id = id;
            ready(Err(QueryError::transport("down")))
        });
        assert!(cache.settle(&key, fetch_id, &Err(QueryError::transport("down"))));

        let snapshot = cache.get(&key).expect("entry");
        assert_eq!(snapshot.status, QueryStatus::Error);
        assert!(snapshot.has_data, "stale data survives a failed refetch");
        assert_eq!(snapshot.failure_count, 1);
    }

    #[tokio::test]
    async fn test_settle_discards_removed_entry() {
        let key = query_key!["user", 1];
        let cache = cache_with(&key, QueryConfig::default());

        let mut fetch_id = 0;
        cache.begin_fetch(&key, None, |id, _, _| {
            fetch_id = id;
            ready(Ok(Arc::new(1) as AnyData))
        });
        cache.remove(&query_key!["user"]);

        assert!(!cache.settle(&key, fetch_id, &Ok(Arc::new(1) as AnyData)));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_invalidate_marks_prefix_matches_stale() {
        let cache = Arc::new(QueryCache::new());
        let config = QueryConfig::new(INFINITE, INFINITE);
        cache.set_data(&query_key!["appointments", 2024, 5], Arc::new(1), &config);
        cache.set_data(&query_key!["appointments", 2024, 6], Arc::new(2), &config);
        cache.set_data(&query_key!["staff"], Arc::new(3), &config);

        let mut keys = cache.invalidate(&query_key!["appointments"]);
        keys.sort();

        assert_eq!(
            keys,
            vec![
                query_key!["appointments", 2024, 5],
                query_key!["appointments", 2024, 6]
            ]
        );
        assert!(cache.get(&query_key!["appointments", 2024, 5]).expect("entry").is_stale);
        assert!(!cache.get(&query_key!["staff"]).expect("entry").is_stale);
        assert_eq!(cache.len(), 3, "invalidation never deletes");
    }

    #[tokio::test]
    async fn test_settle_after_invalidation_stays_stale() {
        let key = query_key!["user", 1];
        let cache = cache_with(&key, QueryConfig::new(INFINITE, INFINITE));

        let mut fetch_id = 0;
        cache.begin_fetch(&key, None, |id, _, _| {
            fetch_id = id;
            ready(Ok(Arc::new(1) as AnyData))
        });
        cache.invalidate(&query_key!["user"]);
        assert!(cache.settle(&key, fetch_id, &Ok(Arc::new(1) as AnyData)));

        let snapshot = cache.get(&key).expect("entry");
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert!(snapshot.is_invalidated);
        assert!(snapshot.is_stale);

        cache.begin_fetch(&key, None, |id, _, _| {
            fetch_id = id;
            ready(Ok(Arc::new(2) as AnyData))
        });
        assert!(cache.settle(&key, fetch_id, &Ok(Arc::new(2) as AnyData)));
        assert!(!cache.get(&key).expect("entry").is_stale);
    }

    #[test]
    fn test_remove_ignores_subscribers() {
        let key = query_key!["user", 7];
        let cache = cache_with(&key, QueryConfig::default());
        cache.acquire(&key, QueryConfig::default(), None);

        let removed = cache.remove(&query_key!["user"]);
        assert_eq!(removed, vec![key.clone()]);
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let key = query_key!["staff"];
        let cache = Arc::new(QueryCache::new());
        let mut rx = cache.subscribe();

        cache.set_data(&key, Arc::new(1), &QueryConfig::new(INFINITE, INFINITE));
        cache.invalidate(&key);
        cache.remove(&key);

        assert_eq!(rx.recv().await.ok(), Some(CacheEvent::Updated(key.clone())));
        assert_eq!(rx.recv().await.ok(), Some(CacheEvent::Invalidated(key.clone())));
        assert_eq!(rx.recv().await.ok(), Some(CacheEvent::Removed(key)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc_after_last_subscriber() {
        let key = query_key!["treatments"];
        let config = QueryConfig::new(Duration::ZERO, Duration::from_secs(30));
        let cache = Arc::new(QueryCache::new());
        cache.acquire(&key, config.clone(), None);
        cache.set_data(&key, Arc::new(1), &config);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(cache.get(&key).is_some(), "subscribed entries are never collected");

        cache.release(&key);
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(cache.get(&key).is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_cancels_gc() {
        let key = query_key!["treatments"];
        let config = QueryConfig::new(Duration::ZERO, Duration::from_secs(30));
        let cache = Arc::new(QueryCache::new());
        cache.set_data(&key, Arc::new(1), &config);

        tokio::time::sleep(Duration::from_secs(10)).await;
        cache.acquire(&key, config, None);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(cache.get(&key).map(|s| s.subscriber_count), Some(1));
    }
}
