//! # Querent - query caching for Elm Architecture TUIs
//!
//! Querent keeps server data in a client-side cache with staleness windows,
//! garbage collection, de-duplicated fetching, prefix invalidation and
//! mutations, and hosts the views that read it in a small Elm Architecture
//! runtime built on [ratatui](https://ratatui.rs/).
//!
//! ## Architecture
//!
//! 1. **Model**: your view state, plus a [`QueryClient`](query::QueryClient) clone
//! 2. **Message**: events that can change the state, including query results
//! 3. **Update**: processes messages and returns commands (mutations,
//!    invalidations, prefetches)
//! 4. **View**: renders the current model
//! 5. **Subscriptions**: terminal input and the [`Query`](query::Query)
//!    observers the current screen needs
//! 6. **Commands**: asynchronous operations that produce messages
//!
//! ## Core Components
//!
//! - [`QueryClient`](query::QueryClient): the cache and everything that reads or writes it
//! - [`QueryObserver`](query::QueryObserver): a live binding to one key
//! - [`Mutation`](query::Mutation): a write with awaited callbacks
//! - [`ApiClient`](http::ApiClient): the JSON fetch adapter
//! - [`Application`](application::Application) and [`Runtime`](runtime::Runtime): the TEA host
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures::FutureExt;
//! use querent::prelude::*;
//! use ratatui::Frame;
//!
//! #[derive(Debug, Clone)]
//! enum Message {
//!     Treatments(QueryResult<Arc<Vec<String>>>),
//! }
//!
//! struct Treatments {
//!     client: QueryClient,
//!     treatments: QueryResult<Arc<Vec<String>>>,
//! }
//!
//! impl Application for Treatments {
//!     type Message = Message;
//!     type Flags = QueryClient;
//!
//!     fn new(client: QueryClient) -> (Self, Command<Message>) {
//!         let treatments = QueryResult::idle();
//!         (Treatments { client, treatments }, Command::none())
//!     }
//!
//!     fn update(&mut self, msg: Message) -> Command<Message> {
//!         match msg {
//!             Message::Treatments(result) => self.treatments = result,
//!         }
//!         Command::none()
//!     }
//!
//!     fn view(&self, _frame: &mut Frame<'_>) {
//!         // Render `self.treatments` here
//!     }
//!
//!     fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!         vec![
//!             Subscription::new(Query::new(
//!                 query_key!["treatments"],
//!                 || async { Ok(vec!["massage".to_string(), "facial".to_string()]) }.boxed(),
//!                 self.client.clone(),
//!             ))
//!             .map(Message::Treatments),
//!         ]
//!     }
//! }
//! ```
//!
//! ## Design Inspiration
//!
//! The runtime follows [iced](https://github.com/iced-rs/iced) 0.12 and the
//! cache follows TanStack Query's stale-while-revalidate model.

pub mod application;
pub mod command;
pub mod http;
pub mod prelude;
pub mod query;
pub mod runtime;
pub mod subscription;
