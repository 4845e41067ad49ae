//! Keyed query cache with de-duplicated fetching, similar to SWR or
//! TanStack Query.
//!
//! # Features
//!
//! - **Queries**: observers bound to a [`QueryKey`] that fetch on mount when
//!   the cached copy is missing or stale, and refetch on focus, reconnect,
//!   polling or invalidation
//! - **Mutations**: write operations with awaited `on_success`, `on_error`
//!   and `on_settled` callbacks
//! - **Prefetching**: warm a key without subscribing to it
//! - **Cache management**: prefix invalidation and removal, direct updates,
//!   garbage collection of unobserved entries
//! - **Error notifications**: failures reported once per page load
//!
//! Everything goes through an explicitly constructed [`QueryClient`]; clones
//! share one cache.
//!
//! # Example
//!
//! ```rust,ignore
//! use querent::prelude::*;
//!
//! struct App {
//!     client: QueryClient,
//!     api: ApiClient,
//!     staff: QueryResult<Arc<Vec<Staff>>>,
//!     patch_user: Mutation<User, User>,
//! }
//!
//! impl Application for App {
//!     fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!         let api = self.api.clone();
//!         vec![
//!             Subscription::new(Query::new(
//!                 query_key!["staff"],
//!                 move || api.get::<Vec<Staff>>("/staff").boxed(),
//!                 self.client.clone(),
//!             ))
//!             .map(Message::Staff),
//!         ]
//!     }
//!
//!     fn update(&mut self, msg: Message) -> Command<Message> {
//!         match msg {
//!             Message::Staff(result) => {
//!                 self.staff = result;
//!                 Command::none()
//!             }
//!             Message::SaveUser(user) => self.patch_user.mutate(user).map(Message::UserSaved),
//!             Message::UserSaved(_) => self.client.invalidate(&query_key![USER]),
//!         }
//!     }
//! }
//! ```

mod cache;
mod client;
mod config;
mod error;
mod infinite;
mod key;
mod mutation;
mod notify;
mod observer;
mod retry;
mod select;
mod subscription;

pub use cache::{CacheEvent, EntrySnapshot, QueryCache, QueryStatus};
pub use client::QueryClient;
pub use config::{
    ClientConfig, ConfigError, INFINITE, NotificationConfig, QueryConfig, QueryOptions, RetryPolicy,
};
pub use error::QueryError;
pub use infinite::{InfiniteData, InfiniteQuery};
pub use key::{KeySegment, QueryKey, USER, user_key, user_key_with_token};
pub use mutation::{Mutation, MutationState, MutationStatus};
pub use notify::{
    ChannelSink, ErrorNotifier, Notification, NotificationSink, Operation, Severity, TracingSink,
    error_title,
};
pub use observer::{QueryObserver, QueryResult, Select};
pub use select::Memoized;
pub use subscription::Query;
