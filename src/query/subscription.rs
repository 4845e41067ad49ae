//! Query observers as runtime subscriptions.
//!
//! A [`Query`] returned from `Application::subscriptions` mounts a
//! [`QueryObserver`] when the runtime starts it and unmounts it when the
//! application stops returning it. Each published state arrives as a
//! message:
//!
//! ```rust,ignore
//! fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!     vec![
//!         Subscription::new(Query::new(
//!             query_key!["staff"],
//!             {
//!                 let api = self.api.clone();
//!                 move || api.get::<Vec<Staff>>("/staff").boxed()
//!             },
//!             self.client.clone(),
//!         ))
//!         .map(Message::Staff),
//!     ]
//! }
//! ```

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use crate::subscription::{SubscriptionId, SubscriptionSource};

use super::client::QueryClient;
use super::config::QueryOptions;
use super::error::QueryError;
use super::key::QueryKey;
use super::observer::{QueryObserver, QueryResult};

type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync>;

/// A subscription that observes one query key.
pub struct Query<V> {
    key: QueryKey,
    fetcher: Fetcher<V>,
    options: QueryOptions,
    client: QueryClient,
}

impl<V> Query<V>
where
    V: Send + Sync + 'static,
{
    pub fn new<F>(key: QueryKey, fetcher: F, client: QueryClient) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        Self {
            key,
            fetcher: Arc::new(fetcher),
            options: QueryOptions::default(),
            client,
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
}

impl<V> SubscriptionSource for Query<V>
where
    V: Send + Sync + 'static,
{
    type Output = QueryResult<Arc<V>>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        let key = self.key.clone();
        let fetcher = self.fetcher.clone();
        let options = self.options.clone();
        let client = self.client.clone();

        stream::unfold(None, move |observer: Option<QueryObserver<V>>| {
            let mount = (client.clone(), key.clone(), fetcher.clone(), options.clone());
            async move {
                let observer = match observer {
                    Some(mut observer) => {
                        if !observer.changed().await {
                            return None;
                        }
                        observer
                    }
                    None => {
                        let (client, key, fetcher, options) = mount;
                        client.observe(&key, move || fetcher(), &options)
                    }
                };
                Some((observer.current(), Some(observer)))
            }
        })
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

impl<V> Hash for Query<V> {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.key.hash(hasher);
    }
}
