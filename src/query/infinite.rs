//! Paginated queries that accumulate pages under a single key.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::client::{QueryClient, downcast, erase};
use super::config::QueryOptions;
use super::error::QueryError;
use super::key::QueryKey;
use super::observer::QueryObserver;

/// Pages fetched so far, with the parameter each one was fetched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfiniteData<P, V> {
    pub pages: Vec<V>,
    pub page_params: Vec<P>,
}

impl<P, V> InfiniteData<P, V> {
    pub fn first(page: V, param: P) -> Self {
        Self {
            pages: vec![page],
            page_params: vec![param],
        }
    }

    /// Every item of every page, in page order.
    pub fn items<'a>(&'a self) -> std::iter::Flatten<std::slice::Iter<'a, V>>
    where
        &'a V: IntoIterator,
    {
        self.pages.iter().flatten()
    }
}

type PageFn<P, V> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync>;
type NextParamFn<P, V> = Arc<dyn Fn(&V, &[V]) -> Option<P> + Send + Sync>;

/// A query whose data grows one page at a time.
///
/// The next page parameter is derived from the last page (and all pages so
/// far); `None` means there are no more pages. Fetching the next page goes
/// through the same de-duplication as any other fetch, and a refetch
/// (invalidation, focus, polling) reloads every page currently cached.
///
/// # Example
///
/// ```rust,ignore
/// let people = InfiniteQuery::new(
///     client.clone(),
///     query_key!["sw-people"],
///     1,
///     move |page: u32| api.get::<Page<Person>>(format!("/people/?page={page}")),
///     |last: &Page<Person>, pages| last.next.as_ref().map(|_| pages.len() as u32 + 1),
/// );
///
/// people.fetch().await?;
/// while people.has_next_page() {
///     people.fetch_next_page().await?;
/// }
/// ```
pub struct InfiniteQuery<P, V> {
    client: QueryClient,
    key: QueryKey,
    initial_param: P,
    fetch_page: PageFn<P, V>,
    next_param: NextParamFn<P, V>,
    options: QueryOptions,
}

impl<P, V> Clone for InfiniteQuery<P, V>
where
    P: Clone,
{
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            key: self.key.clone(),
            initial_param: self.initial_param.clone(),
            fetch_page: self.fetch_page.clone(),
            next_param: self.next_param.clone(),
            options: self.options.clone(),
        }
    }
}

impl<P, V> fmt::Debug for InfiniteQuery<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfiniteQuery")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<P, V> InfiniteQuery<P, V>
where
    P: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, N>(client: QueryClient, key: QueryKey, initial_param: P, fetch_page: F, next_param: N) -> Self
    where
        F: Fn(P) -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
        N: Fn(&V, &[V]) -> Option<P> + Send + Sync + 'static,
    {
        Self {
            client,
            key,
            initial_param,
            fetch_page: Arc::new(fetch_page),
            next_param: Arc::new(next_param),
            options: QueryOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub const fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Cached pages, if any.
    pub fn data(&self) -> Option<Arc<InfiniteData<P, V>>> {
        self.client.get_query_data(&self.key)
    }

    /// Loads the first page, or serves the cached pages while fresh.
    pub async fn fetch(&self) -> Result<Arc<InfiniteData<P, V>>, QueryError> {
        self.client
            .fetch_query(&self.key, self.refetch_all(), &self.options)
            .await
    }

    /// Whether the last cached page has a successor.
    pub fn has_next_page(&self) -> bool {
        self.data()
            .and_then(|data| self.next_after(&data))
            .is_some()
    }

    /// Appends the next page. Returns the cached pages unchanged when there
    /// is no next page.
    pub async fn fetch_next_page(&self) -> Result<Arc<InfiniteData<P, V>>, QueryError> {
        let current = match self.data() {
            Some(data) => data,
            None => return self.fetch().await,
        };
        let Some(param) = self.next_after(&current) else {
            return Ok(current);
        };

        let fetch_page = self.fetch_page.clone();
        let append = erase(move || {
            let base = current.clone();
            let param = param.clone();
            let page = fetch_page(param.clone());
            async move {
                let page = page.await?;
                let mut next = InfiniteData::clone(&base);
                next.pages.push(page);
                next.page_params.push(param);
                Ok(next)
            }
            .boxed()
        });

        let in_flight = self
            .client
            .start_fetch_with(&self.key, Some(append))
            .ok_or_else(|| QueryError::FetchError(format!("no fetch could be started for {}", self.key)))?;
        in_flight.await.and_then(downcast)
    }

    /// Subscribes to the accumulated pages.
    pub fn observe(&self) -> QueryObserver<InfiniteData<P, V>> {
        self.client.observe(&self.key, self.refetch_all(), &self.options)
    }

    fn next_after(&self, data: &InfiniteData<P, V>) -> Option<P> {
        let last = data.pages.last()?;
        (self.next_param)(last, &data.pages)
    }

    /// Fetcher that reloads as many pages as are currently cached (at least
    /// one), deriving each parameter from the freshly loaded pages.
    fn refetch_all(
        &self,
    ) -> impl Fn() -> BoxFuture<'static, Result<InfiniteData<P, V>, QueryError>> + Send + Sync + 'static
    {
        let client = self.client.clone();
        let key = self.key.clone();
        let initial_param = self.initial_param.clone();
        let fetch_page = self.fetch_page.clone();
        let next_param = self.next_param.clone();

        move || {
            let wanted = client
                .get_query_data::<InfiniteData<P, V>>(&key)
                .map_or(1, |data| data.pages.len().max(1));
            let initial_param = initial_param.clone();
            let fetch_page = fetch_page.clone();
            let next_param = next_param.clone();

            async move {
                let first = fetch_page(initial_param.clone()).await?;
                let mut data = InfiniteData::first(first, initial_param);
                while data.pages.len() < wanted {
                    let Some(param) = data.pages.last().and_then(|last| next_param(last, &data.pages))
                    else {
                        break;
                    };
                    let page = fetch_page(param.clone()).await?;
                    data.pages.push(page);
                    data.page_params.push(param);
                }
                Ok(data)
            }
            .boxed()
        }
    }
}
