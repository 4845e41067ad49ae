//! Subscriber binding between a view and a cache entry.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::cache::{CacheEvent, ErasedFetcher, QueryStatus};
use super::client::QueryClient;
use super::config::QueryConfig;
use super::error::QueryError;
use super::key::QueryKey;

/// Projection applied to cached data before it reaches a subscriber.
pub type Select<V, S> = Arc<dyn Fn(&Arc<V>) -> S + Send + Sync>;

/// What a subscriber sees of a query.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub status: QueryStatus,
    /// Last successfully fetched data, kept while refetching or after a
    /// failed refetch.
    pub data: Option<T>,
    pub error: Option<QueryError>,
    pub is_fetching: bool,
    pub is_stale: bool,
    pub updated_at: Option<Instant>,
}

impl<T> QueryResult<T> {
    pub const fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_fetching: false,
            is_stale: true,
            updated_at: None,
        }
    }

    /// Returns the data if any has been fetched, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Returns `true` while the first fetch is in flight (no data yet).
    pub const fn is_loading(&self) -> bool {
        matches!(self.status, QueryStatus::Pending) && self.data.is_none()
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self.status, QueryStatus::Pending)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.status, QueryStatus::Success)
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.status, QueryStatus::Error)
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self.status, QueryStatus::Idle)
    }

    /// Returns `true` if the data is stale and will be refetched on the
    /// next trigger.
    pub const fn is_stale(&self) -> bool {
        self.is_stale
    }
}

fn same<S>(a: &QueryResult<S>, b: &QueryResult<S>, eq: fn(&S, &S) -> bool) -> bool {
    let data = match (&a.data, &b.data) {
        (Some(x), Some(y)) => eq(x, y),
        (None, None) => true,
        _ => false,
    };
    data && a.status == b.status
        && a.error == b.error
        && a.is_fetching == b.is_fetching
        && a.is_stale == b.is_stale
}

fn compute<V, S>(client: &QueryClient, key: &QueryKey, select: &Select<V, S>) -> QueryResult<S>
where
    V: Send + Sync + 'static,
{
    let Some((snapshot, data)) = client.cache().view(key) else {
        return QueryResult::idle();
    };
    let data = data.and_then(|data| match data.downcast::<V>() {
        Ok(value) => Some(select(&value)),
        Err(_) => {
            tracing::warn!(%key, "cached data has an unexpected type");
            None
        }
    });
    QueryResult {
        status: snapshot.status,
        data,
        error: snapshot.error,
        is_fetching: snapshot.is_fetching,
        is_stale: snapshot.is_stale,
        updated_at: snapshot.updated_at,
    }
}

/// A live subscription to one query key.
///
/// While an observer exists the entry counts it as a subscriber, so it is
/// never garbage collected. The observer publishes a new [`QueryResult`]
/// whenever the projected state changes, refetches on its polling interval
/// and re-attaches if the entry is removed underneath it.
///
/// Closing (or dropping) the observer detaches it; the last subscriber to
/// leave starts the entry's garbage-collection timer.
///
/// # Example
///
/// ```rust,no_run
/// use futures::FutureExt;
/// use querent::query::{QueryClient, QueryOptions};
/// use querent::query_key;
///
/// # async fn demo() {
/// let client = QueryClient::new();
/// let mut staff = client.observe(
///     &query_key!["staff"],
///     || async { Ok(vec!["Divya", "Sandra", "Michael", "Mateo"]) }.boxed(),
///     &QueryOptions::new(),
/// );
///
/// let loaded = staff.wait_for(|r| r.is_success()).await;
/// staff.close().await;
/// # }
/// ```
pub struct QueryObserver<V, S = Arc<V>> {
    key: QueryKey,
    client: QueryClient,
    state: watch::Receiver<QueryResult<S>>,
    select: watch::Sender<Select<V, S>>,
    token: CancellationToken,
    join: JoinHandle<()>,
    _guard: DropGuard,
}

impl<V, S> fmt::Debug for QueryObserver<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<V, S> QueryObserver<V, S>
where
    V: Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    pub(crate) fn spawn(
        client: QueryClient,
        key: QueryKey,
        fetcher: ErasedFetcher,
        config: QueryConfig,
        select: Select<V, S>,
        eq: fn(&S, &S) -> bool,
    ) -> Self {
        // Subscribe before attaching so no event is missed.
        let events = client.cache().subscribe();
        client
            .cache()
            .acquire(&key, config.clone(), Some(fetcher.clone()));
        if client.cache().needs_fetch(&key) {
            client.start_fetch(&key);
        }

        let (state_tx, state) = watch::channel(compute(&client, &key, &select));
        let (select_tx, select_rx) = watch::channel(select);
        let token = CancellationToken::new();

        let driver = Driver {
            key: key.clone(),
            client: client.clone(),
            fetcher,
            config,
            events,
            select: select_rx,
            state: state_tx,
            eq,
            token: token.clone(),
        };
        let join = tokio::spawn(driver.run());

        Self {
            key,
            client,
            state,
            select: select_tx,
            _guard: token.clone().drop_guard(),
            token,
            join,
        }
    }

    pub const fn key(&self) -> &QueryKey {
        &self.key
    }

    /// The latest published state.
    pub fn current(&self) -> QueryResult<S> {
        self.state.borrow().clone()
    }

    /// Waits for the next published change.
    ///
    /// Returns `false` once the observer has stopped.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Waits until the published state satisfies `predicate`, checking the
    /// current state first.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&QueryResult<S>) -> bool,
    ) -> Option<QueryResult<S>> {
        self.state.wait_for(predicate).await.ok().map(|state| state.clone())
    }

    /// A receiver of published states, e.g. to feed a stream.
    pub fn subscribe(&self) -> watch::Receiver<QueryResult<S>> {
        self.state.clone()
    }

    /// Refetches the entry, ignoring staleness.
    pub async fn refetch(&self) -> Result<(), QueryError> {
        self.client.refetch_query(&self.key).await
    }

    /// Replaces the projection. The new projection is applied to the cached
    /// data without a network call.
    pub fn set_select(&self, select: impl Fn(&Arc<V>) -> S + Send + Sync + 'static) {
        self.select.send_replace(Arc::new(select));
    }

    /// Detaches from the entry and waits until the subscriber count has
    /// been released.
    pub async fn close(self) {
        self.token.cancel();
        if let Err(err) = self.join.await {
            tracing::warn!(key = %self.key, error = %err, "observer task failed");
        }
    }
}

struct Driver<V, S> {
    key: QueryKey,
    client: QueryClient,
    fetcher: ErasedFetcher,
    config: QueryConfig,
    events: broadcast::Receiver<CacheEvent>,
    select: watch::Receiver<Select<V, S>>,
    state: watch::Sender<QueryResult<S>>,
    eq: fn(&S, &S) -> bool,
    token: CancellationToken,
}

impl<V, S> Driver<V, S>
where
    V: Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    async fn run(mut self) {
        let mut poll = self.config.refetch_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                () = self.token.cancelled() => break,
                event = self.events.recv() => match event {
                    Ok(CacheEvent::Removed(key)) if key == self.key => {
                        tracing::debug!(%key, "observed query removed, re-attaching");
                        self.client.cache().acquire(
                            &self.key,
                            self.config.clone(),
                            Some(self.fetcher.clone()),
                        );
                        self.publish();
                    }
                    Ok(event) if *event.key() == self.key => self.publish(),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::trace!(key = %self.key, skipped, "observer lagged");
                        self.publish();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = self.select.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.publish();
                }
                () = tick(&mut poll) => {
                    if self.config.enabled {
                        tracing::trace!(key = %self.key, "polling refetch");
                        self.client.start_fetch(&self.key);
                    }
                }
            }
        }

        self.client.cache_handle().release(&self.key);
    }

    fn publish(&self) {
        let select = self.select.borrow().clone();
        let next = compute(&self.client, &self.key, &select);
        let eq = self.eq;
        self.state.send_if_modified(move |current| {
            if same(current, &next, eq) {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
