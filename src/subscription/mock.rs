//! Mock subscription source for testing.
//!
//! [`MockSource`] emits values on demand, so applications can be driven
//! deterministically without a terminal or a network. Clones share one
//! broadcast channel: the application returns `Subscription::new(mock)` from
//! `subscriptions()` while the test keeps a clone to emit from.
//!
//! ```no_run
//! use querent::prelude::*;
//! use querent::subscription::mock::MockSource;
//! # use ratatui::Frame;
//!
//! #[derive(Clone)]
//! enum Input {
//!     NextMonth,
//!     PreviousMonth,
//! }
//!
//! struct Calendar {
//!     month_offset: i32,
//!     input: MockSource<Input>,
//! }
//!
//! impl Application for Calendar {
//!     type Message = Input;
//!     type Flags = MockSource<Input>;
//!
//!     fn new(input: MockSource<Input>) -> (Self, Command<Input>) {
//!         (Self { month_offset: 0, input }, Command::none())
//!     }
//!
//!     fn update(&mut self, msg: Input) -> Command<Input> {
//!         match msg {
//!             Input::NextMonth => self.month_offset += 1,
//!             Input::PreviousMonth => self.month_offset -= 1,
//!         }
//!         Command::none()
//!     }
//!
//!     fn view(&self, _frame: &mut Frame<'_>) {}
//!
//!     fn subscriptions(&self) -> Vec<Subscription<Input>> {
//!         vec![Subscription::new(self.input.clone())]
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::subscription::{SubscriptionId, SubscriptionSource};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A subscription source that emits values on demand.
///
/// Every `MockSource` created with [`new`](Self::new) has its own identity;
/// clones share it.
#[derive(Debug, Clone)]
pub struct MockSource<T: Clone> {
    sender: broadcast::Sender<T>,
    id: SubscriptionId,
}

impl<T: Clone + Send + 'static> MockSource<T> {
    /// Creates a source buffering at most `capacity` undelivered values.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            id: SubscriptionId::of::<Self>(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Emits a value to every running subscription of this source.
    ///
    /// # Errors
    ///
    /// Returns an error if no subscription is running.
    pub fn emit(&self, value: T) -> Result<usize, broadcast::error::SendError<T>> {
        self.sender.send(value)
    }

    /// Number of running subscriptions of this source.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for MockSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> SubscriptionSource for MockSource<T> {
    type Output = T;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(|result| async move { result.ok() })
            .boxed()
    }

    fn id(&self) -> SubscriptionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Subscription;

    #[test]
    fn test_emit_requires_a_receiver() {
        let mock = MockSource::<i32>::new();
        assert!(mock.emit(42).is_err());

        let _rx = mock.sender.subscribe();
        assert_eq!(mock.emit(42).expect("should emit to receiver"), 1);
    }

    #[test]
    fn test_clones_share_identity_and_channel() {
        let a = MockSource::<i32>::new();
        let b = a.clone();
        let other = MockSource::<i32>::new();

        let _rx = a.sender.subscribe();
        assert_eq!(b.receiver_count(), 1);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), other.id());
    }

    #[tokio::test]
    async fn test_stream_receives_values() {
        let mock = MockSource::<i32>::new();
        let sub = Subscription::new(mock.clone());
        let mut stream = (sub.spawn)();

        mock.emit(1).expect("should emit to stream");
        mock.emit(2).expect("should emit to stream");

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
    }
}
