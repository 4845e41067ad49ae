use std::any::type_name;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};

use crate::command::Command;

use super::cache::{AnyData, EntrySnapshot, ErasedFetcher, InFlight, QueryCache};
use super::config::{ClientConfig, QueryConfig, QueryOptions};
use super::error::QueryError;
use super::key::QueryKey;
use super::mutation::Mutation;
use super::notify::ErrorNotifier;
use super::observer::QueryObserver;
use super::retry;

/// Wraps a typed fetcher so the cache can store it next to fetchers of
/// other value types.
pub(crate) fn erase<V, F>(fetcher: F) -> ErasedFetcher
where
    V: Send + Sync + 'static,
    F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
{
    Arc::new(move || {
        let fut = fetcher();
        async move { fut.await.map(|value| Arc::new(value) as AnyData) }.boxed()
    })
}

pub(crate) fn downcast<V: Send + Sync + 'static>(data: AnyData) -> Result<Arc<V>, QueryError> {
    data.downcast::<V>().map_err(|_| {
        QueryError::DecodeError(format!("cached data is not a {}", type_name::<V>()))
    })
}

/// Entry point to the query cache.
///
/// The `QueryClient` is the explicitly constructed context shared by every
/// view. It handles:
/// - Caching query results and their lifecycle (staleness, GC)
/// - De-duplicating and retrying fetches
/// - Invalidation, removal and direct updates
/// - Focus and reconnect refetch triggers
///
/// Cloning is cheap; all clones share the same cache.
///
/// # Example
///
/// ```
/// use querent::query::{QueryClient, QueryConfig};
/// use std::time::Duration;
///
/// let client = QueryClient::with_config(QueryConfig::new(
///     Duration::from_secs(600), // stale_time
///     Duration::from_secs(900), // gc_time
/// ));
/// ```
#[derive(Debug, Clone)]
pub struct QueryClient {
    cache: Arc<QueryCache>,
    config: Arc<QueryConfig>,
    notifier: ErrorNotifier,
    focused: Arc<AtomicBool>,
    online: Arc<AtomicBool>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    /// Creates a new query client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        Self {
            cache: Arc::new(QueryCache::new()),
            config: Arc::new(config),
            notifier: ErrorNotifier::default(),
            focused: Arc::new(AtomicBool::new(true)),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Creates a client from a loaded [`ClientConfig`].
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_config(config.queries.clone()).with_notifier(
            ErrorNotifier::default()
                .with_error_id(config.notifications.error_id.clone())
                .with_enabled(config.notifications.enabled),
        )
    }

    /// Replaces the error notifier failures are reported to.
    #[must_use]
    pub fn with_notifier(mut self, notifier: ErrorNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub(crate) const fn cache_handle(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn notifier(&self) -> &ErrorNotifier {
        &self.notifier
    }

    pub fn get_query_state(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        self.cache.get(key)
    }

    /// Returns the cached data for `key`, fresh or not.
    ///
    /// `None` when the entry is missing, has no data yet, or holds a value
    /// of another type.
    pub fn get_query_data<V: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<V>> {
        self.cache.data(key).and_then(|data| downcast(data).ok())
    }

    /// Overwrites the data of `key` without a network call.
    ///
    /// The entry becomes `Success` and fresh, and observers are notified.
    pub fn set_query_data<V: Send + Sync + 'static>(&self, key: &QueryKey, data: V) {
        self.cache.set_data(key, Arc::new(data), &self.config);
    }

    /// Returns data for `key`, fetching only if the cached copy is missing
    /// or stale. Joins a fetch that is already in flight.
    pub async fn fetch_query<V, F>(
        &self,
        key: &QueryKey,
        fetcher: F,
        options: &QueryOptions,
    ) -> Result<Arc<V>, QueryError>
    where
        V: Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        self.cache
            .ensure(key, self.config.merge(options), Some(erase(fetcher)));
        if let Some(data) = self.cache.fresh_data(key) {
            tracing::trace!(%key, "serving fresh data");
            return downcast(data);
        }
        let in_flight = self.start_fetch(key).ok_or_else(|| {
            QueryError::FetchError(format!("no fetch could be started for {key}"))
        })?;
        in_flight.await.and_then(downcast)
    }

    /// Warms `key` without attaching a subscriber.
    ///
    /// Does nothing when fresh data is cached. Failures are recorded in the
    /// entry but not returned.
    pub async fn prefetch_query<V, F>(&self, key: &QueryKey, fetcher: F, options: &QueryOptions)
    where
        V: Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        if let Err(err) = self.fetch_query(key, fetcher, options).await {
            tracing::debug!(%key, error = %err, "prefetch failed");
        }
    }

    /// Marks every entry matching `prefix` stale.
    ///
    /// Matching entries with active subscribers refetch immediately; the
    /// returned future resolves once those refetches have settled. Inactive
    /// entries refetch on their next read.
    ///
    /// A fetch already in flight started before the invalidation, so its
    /// result is stored stale. Active entries wait for it and fetch again.
    pub async fn invalidate_queries(&self, prefix: &QueryKey) {
        let (running, idle): (Vec<QueryKey>, Vec<QueryKey>) = self
            .cache
            .invalidate(prefix)
            .into_iter()
            .filter(|key| self.cache.is_active(key))
            .partition(|key| self.cache.is_fetching(key));

        let refetches: Vec<InFlight> = idle
            .iter()
            .chain(&running)
            .filter_map(|key| self.start_fetch(key))
            .collect();
        join_all(refetches).await;

        if !running.is_empty() {
            tracing::debug!(%prefix, count = running.len(), "refetching queries invalidated mid-fetch");
            let refetches: Vec<InFlight> = running
                .iter()
                .filter(|key| self.cache.is_active(key))
                .filter_map(|key| self.start_fetch(key))
                .collect();
            join_all(refetches).await;
        }
    }

    /// Deletes every entry matching `prefix`, whatever its subscriber count.
    ///
    /// Results of fetches still in flight for those entries are discarded.
    pub fn remove_queries(&self, prefix: &QueryKey) -> usize {
        self.cache.remove(prefix).len()
    }

    /// Refetches `key` with its registered fetcher, ignoring staleness.
    ///
    /// Succeeds without doing anything when the entry is missing or
    /// disabled.
    pub async fn refetch_query(&self, key: &QueryKey) -> Result<(), QueryError> {
        match self.start_fetch(key) {
            Some(in_flight) => in_flight.await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Number of fetches in flight for keys matching `prefix`.
    pub fn is_fetching(&self, prefix: &QueryKey) -> usize {
        self.cache
            .find_all(prefix)
            .iter()
            .filter(|key| self.cache.is_fetching(key))
            .count()
    }

    /// Subscribes to `key`. See [`QueryObserver`].
    pub fn observe<V, F>(&self, key: &QueryKey, fetcher: F, options: &QueryOptions) -> QueryObserver<V>
    where
        V: Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        QueryObserver::spawn(
            self.clone(),
            key.clone(),
            erase(fetcher),
            self.config.merge(options),
            Arc::new(|data: &Arc<V>| Arc::clone(data)),
            |a: &Arc<V>, b: &Arc<V>| Arc::ptr_eq(a, b),
        )
    }

    /// Subscribes to `key` through a projection of the cached value.
    ///
    /// Observers are only notified when the projected value changes.
    pub fn observe_select<V, S, F, P>(
        &self,
        key: &QueryKey,
        fetcher: F,
        options: &QueryOptions,
        select: P,
    ) -> QueryObserver<V, S>
    where
        V: Send + Sync + 'static,
        S: PartialEq + Clone + Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
        P: Fn(&Arc<V>) -> S + Send + Sync + 'static,
    {
        QueryObserver::spawn(
            self.clone(),
            key.clone(),
            erase(fetcher),
            self.config.merge(options),
            Arc::new(select),
            <S as PartialEq>::eq,
        )
    }

    /// Creates a mutation bound to this client.
    pub fn mutation<I, O, F>(&self, mutator: F) -> Mutation<I, O>
    where
        I: Clone + Send + Sync + 'static,
        O: Clone + Send + Sync + 'static,
        F: Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync + 'static,
    {
        Mutation::new(self.clone(), mutator)
    }

    /// Records whether the application window has focus.
    ///
    /// Regaining focus refetches stale, observed queries that have
    /// `refetch_on_window_focus` set.
    pub fn set_focused(&self, focused: bool) {
        let was = self.focused.swap(focused, Ordering::SeqCst);
        if focused && !was {
            tracing::debug!("window focus regained");
            self.refetch_active(|config| config.refetch_on_window_focus);
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    /// Records network availability.
    ///
    /// Coming back online refetches stale, observed queries that have
    /// `refetch_on_reconnect` set.
    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if online && !was {
            tracing::debug!("network reconnected");
            self.refetch_active(|config| config.refetch_on_reconnect);
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Drops every entry and cancels all garbage-collection timers.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Invalidates `prefix` as a side effect of `update`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// fn update(&mut self, msg: Message) -> Command<Message> {
    ///     match msg {
    ///         Message::Refresh => self.client.invalidate(&query_key!["appointments"]),
    ///     }
    /// }
    /// ```
    pub fn invalidate<Msg>(&self, prefix: &QueryKey) -> Command<Msg>
    where
        Msg: Send + 'static,
    {
        let client = self.clone();
        let prefix = prefix.clone();
        Command::task(async move { client.invalidate_queries(&prefix).await })
    }

    /// Prefetches `key` as a side effect of `update`.
    pub fn prefetch<Msg, V, F>(&self, key: &QueryKey, fetcher: F, options: &QueryOptions) -> Command<Msg>
    where
        Msg: Send + 'static,
        V: Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        let client = self.clone();
        let key = key.clone();
        let options = options.clone();
        Command::task(async move { client.prefetch_query(&key, fetcher, &options).await })
    }

    /// Starts (or joins) the fetch of `key`.
    pub(crate) fn start_fetch(&self, key: &QueryKey) -> Option<InFlight> {
        self.start_fetch_with(key, None)
    }

    /// Like [`start_fetch`](Self::start_fetch), running `fetcher` instead of
    /// the registered one if a new fetch is started.
    pub(crate) fn start_fetch_with(
        &self,
        key: &QueryKey,
        fetcher: Option<ErasedFetcher>,
    ) -> Option<InFlight> {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(%key, "fetch requested outside of a tokio runtime");
            return None;
        }
        let cache = self.cache.clone();
        let notifier = self.notifier.clone();
        self.cache.begin_fetch(key, fetcher, |fetch_id, fetcher, retry| {
            retry::spawn_fetch(cache, notifier, key.clone(), fetch_id, fetcher, retry)
        })
    }

    fn refetch_active(&self, trigger: impl Fn(&QueryConfig) -> bool) {
        for key in self.cache.active_stale_keys(trigger) {
            self.start_fetch(&key);
        }
    }
}
