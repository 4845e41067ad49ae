//! Mutations: one-off writes with follow-up callbacks.
//!
//! Unlike queries, mutations are never cached, de-duplicated or retried.
//! Each [`Mutation`] owns its own [`MutationState`], and its callbacks are
//! the place to invalidate or overwrite the queries it affected.
//!
//! # Example
//!
//! ```rust,ignore
//! let update_user = client
//!     .mutation(|patch: Vec<PatchOperation>| api.patch("/user/1", &patch).boxed())
//!     .on_success({
//!         let client = client.clone();
//!         move |user: User, _| {
//!             client.set_query_data(&user_key(user.id), user);
//!             async {}.boxed()
//!         }
//!     })
//!     .on_settled({
//!         let client = client.clone();
//!         move |_, _| {
//!             let client = client.clone();
//!             async move { client.invalidate_queries(&query_key!["user"]).await }.boxed()
//!         }
//!     });
//!
//! // In `update`:
//! update_user.mutate(patch).map(Message::UserPatched)
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::command::Command;

use super::client::QueryClient;
use super::error::QueryError;
use super::key::QueryKey;
use super::notify::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// The state of a mutation.
#[derive(Debug, Clone)]
pub struct MutationState<O> {
    pub status: MutationStatus,
    pub data: Option<O>,
    pub error: Option<QueryError>,
    /// When the latest run started.
    pub submitted_at: Option<Instant>,
}

impl<O> Default for MutationState<O> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<O> MutationState<O> {
    pub const fn idle() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
            submitted_at: None,
        }
    }

    /// Returns the result data if the mutation succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&O> {
        self.data.as_ref()
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self.status, MutationStatus::Idle)
    }

    /// Returns `true` if the mutation is currently running.
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, MutationStatus::Pending)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.status, MutationStatus::Success)
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.status, MutationStatus::Error)
    }
}

type MutateFn<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync>;
type SuccessFn<I, O> = Arc<dyn Fn(O, I) -> BoxFuture<'static, ()> + Send + Sync>;
type ErrorFn<I> = Arc<dyn Fn(QueryError, I) -> BoxFuture<'static, ()> + Send + Sync>;
type SettledFn<I, O> = Arc<dyn Fn(Result<O, QueryError>, I) -> BoxFuture<'static, ()> + Send + Sync>;

/// A write operation (POST, PUT, PATCH, DELETE) with callbacks.
///
/// `run` resolves only after `on_success`/`on_error` and then `on_settled`
/// have completed, so awaited follow-up work (typically an invalidation
/// refetch) is done before the final status is published.
///
/// Clones share state and callbacks.
pub struct Mutation<I, O> {
    client: QueryClient,
    mutation_key: Option<QueryKey>,
    mutator: MutateFn<I, O>,
    on_success: Option<SuccessFn<I, O>>,
    on_error: Option<ErrorFn<I>>,
    on_settled: Option<SettledFn<I, O>>,
    state: Arc<watch::Sender<MutationState<O>>>,
    generation: Arc<AtomicU64>,
}

impl<I, O> Clone for Mutation<I, O> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            mutation_key: self.mutation_key.clone(),
            mutator: self.mutator.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_settled: self.on_settled.clone(),
            state: self.state.clone(),
            generation: self.generation.clone(),
        }
    }
}

impl<I, O> fmt::Debug for Mutation<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("mutation_key", &self.mutation_key)
            .finish_non_exhaustive()
    }
}

impl<I, O> Mutation<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub(crate) fn new<F>(client: QueryClient, mutator: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(MutationState::idle());
        Self {
            client,
            mutation_key: None,
            mutator: Arc::new(mutator),
            on_success: None,
            on_error: None,
            on_settled: None,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Names the mutation in logs.
    #[must_use]
    pub fn with_key(mut self, key: QueryKey) -> Self {
        self.mutation_key = Some(key);
        self
    }

    #[must_use]
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(O, I) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(QueryError, I) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Runs after `on_success`/`on_error`, for both outcomes.
    #[must_use]
    pub fn on_settled<F>(mut self, f: F) -> Self
    where
        F: Fn(Result<O, QueryError>, I) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.on_settled = Some(Arc::new(f));
        self
    }

    pub const fn mutation_key(&self) -> Option<&QueryKey> {
        self.mutation_key.as_ref()
    }

    pub fn state(&self) -> MutationState<O> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<O>> {
        self.state.subscribe()
    }

    /// Runs the mutation and its callbacks.
    pub async fn run(&self, input: I) -> Result<O, QueryError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let submitted_at = Instant::now();
        self.publish(
            generation,
            MutationState {
                status: MutationStatus::Pending,
                data: None,
                error: None,
                submitted_at: Some(submitted_at),
            },
        );

        let result = (self.mutator)(input.clone()).await;

        match &result {
            Ok(data) => {
                tracing::debug!(key = ?self.mutation_key, "mutation succeeded");
                if let Some(on_success) = &self.on_success {
                    on_success(data.clone(), input.clone()).await;
                }
            }
            Err(err) => {
                tracing::warn!(key = ?self.mutation_key, error = %err, "mutation failed");
                self.client.notifier().report(Operation::Mutation, err);
                if let Some(on_error) = &self.on_error {
                    on_error(err.clone(), input.clone()).await;
                }
            }
        }
        if let Some(on_settled) = &self.on_settled {
            on_settled(result.clone(), input).await;
        }

        let state = match &result {
            Ok(data) => MutationState {
                status: MutationStatus::Success,
                data: Some(data.clone()),
                error: None,
                submitted_at: Some(submitted_at),
            },
            Err(err) => MutationState {
                status: MutationStatus::Error,
                data: None,
                error: Some(err.clone()),
                submitted_at: Some(submitted_at),
            },
        };
        self.publish(generation, state);
        result
    }

    /// Runs the mutation as a side effect of `update`.
    pub fn mutate(&self, input: I) -> Command<Result<O, QueryError>> {
        let mutation = self.clone();
        Command::future(async move { mutation.run(input).await })
    }

    /// Returns to `Idle` without invoking the mutation function.
    ///
    /// A run still in flight completes, but no longer publishes its state.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(MutationState::idle());
    }

    fn publish(&self, generation: u64, state: MutationState<O>) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.state.send_replace(state);
        } else {
            tracing::trace!(key = ?self.mutation_key, "mutation was reset, dropping state");
        }
    }
}
