//! Long-lived message sources.
//!
//! A [`Subscription`] wraps a [`SubscriptionSource`] (terminal events, a
//! query observer, a test mock) together with a stable [`SubscriptionId`].
//! After every `update` the runtime diffs the application's subscriptions by
//! id: new ids are started, vanished ids are cancelled and the rest keep
//! running untouched. Mounting a query view is therefore just returning its
//! [`Query`](crate::query::Query) subscription, and unmounting it is no
//! longer returning it.

pub mod mock;
pub mod terminal;

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identity of a subscription across `subscriptions()` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    type_id: TypeId,
    hash: u64,
}

impl SubscriptionId {
    /// Creates an id for a source of type `T` with the given parameter hash.
    pub fn of<T: 'static>(hash: u64) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            hash,
        }
    }
}

/// A source of messages that runs until cancelled.
pub trait SubscriptionSource: Send + 'static {
    type Output;

    /// Starts the source. Called once per activation.
    fn stream(&self) -> BoxStream<'static, Self::Output>;

    fn id(&self) -> SubscriptionId;
}

/// A subscription producing messages of type `Msg`.
pub struct Subscription<Msg> {
    pub(crate) id: SubscriptionId,
    pub(crate) spawn: Box<dyn FnOnce() -> BoxStream<'static, Msg> + Send>,
}

impl<Msg> fmt::Debug for Subscription<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<Msg: Send + 'static> Subscription<Msg> {
    pub fn new<S>(source: S) -> Self
    where
        S: SubscriptionSource<Output = Msg>,
    {
        Self {
            id: source.id(),
            spawn: Box::new(move || source.stream()),
        }
    }

    /// Converts the produced values, keeping the subscription's identity.
    pub fn map<F, T>(self, f: F) -> Subscription<T>
    where
        F: Fn(Msg) -> T + Send + 'static,
        T: Send + 'static,
    {
        let spawn = self.spawn;
        Subscription {
            id: self.id,
            spawn: Box::new(move || spawn().map(f).boxed()),
        }
    }

    pub const fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Handle for a running subscription task.
#[derive(Debug)]
pub struct Handle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Handle {
    pub const fn new(token: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { token, join }
    }

    /// Requests cancellation without waiting.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Cancels the subscription and waits for task completion.
    pub async fn cancel(self) {
        self.token.cancel();
        let _ = self.join.await;
    }
}

/// Keeps the set of running subscriptions in line with what the
/// application asks for.
pub struct SubscriptionManager<Msg> {
    running: HashMap<SubscriptionId, Handle>,
    tx: mpsc::UnboundedSender<Msg>,
}

impl<Msg: Send + 'static> SubscriptionManager<Msg> {
    pub fn new(tx: mpsc::UnboundedSender<Msg>) -> Self {
        Self {
            running: HashMap::new(),
            tx,
        }
    }

    /// Starts new subscriptions and stops those no longer requested.
    pub fn update(&mut self, subscriptions: impl IntoIterator<Item = Subscription<Msg>>) {
        let mut next = HashMap::with_capacity(self.running.len());
        for subscription in subscriptions {
            let id = subscription.id;
            if next.contains_key(&id) {
                continue;
            }
            let handle = match self.running.remove(&id) {
                Some(handle) => handle,
                None => self.start(subscription),
            };
            next.insert(id, handle);
        }
        for (id, handle) in self.running.drain() {
            tracing::trace!(?id, "stopping subscription");
            handle.stop();
        }
        self.running = next;
    }

    /// Number of running subscriptions.
    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Cancels every subscription and waits for their tasks.
    pub async fn shutdown(&mut self) {
        for (_, handle) in self.running.drain() {
            handle.cancel().await;
        }
    }

    fn start(&self, subscription: Subscription<Msg>) -> Handle {
        tracing::trace!(id = ?subscription.id, "starting subscription");
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let mut stream = (subscription.spawn)();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    item = stream.next() => match item {
                        Some(msg) => {
                            if tx.send(msg).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });
        Handle::new(token, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::mock::MockSource;

    #[tokio::test]
    async fn test_update_keeps_running_subscriptions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = SubscriptionManager::new(tx);
        let mock = MockSource::<i32>::new();

        manager.update(vec![Subscription::new(mock.clone())]);
        tokio::task::yield_now().await;
        manager.update(vec![Subscription::new(mock.clone())]);
        tokio::task::yield_now().await;

        assert_eq!(manager.len(), 1);
        assert_eq!(mock.receiver_count(), 1);
        mock.emit(7).expect("receiver");
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_update_stops_removed_subscriptions() {
        let (tx, _rx) = mpsc::unbounded_channel::<i32>();
        let mut manager = SubscriptionManager::new(tx);
        let mock = MockSource::<i32>::new();

        manager.update(vec![Subscription::new(mock.clone())]);
        tokio::task::yield_now().await;
        assert_eq!(mock.receiver_count(), 1);

        manager.update(Vec::new());
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(manager.is_empty());
        assert_eq!(mock.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_map_keeps_id() {
        let mock = MockSource::<i32>::new();
        let sub = Subscription::new(mock.clone());
        let id = sub.id();
        let mapped = sub.map(|n| n.to_string());
        assert_eq!(mapped.id(), id);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks() {
        let (tx, _rx) = mpsc::unbounded_channel::<i32>();
        let mut manager = SubscriptionManager::new(tx);
        let mock = MockSource::<i32>::new();
        manager.update(vec![Subscription::new(mock.clone())]);
        tokio::task::yield_now().await;

        manager.shutdown().await;
        assert_eq!(mock.receiver_count(), 0);
    }
}
