//! Prelude module for convenient imports.
//!
//! ```
//! use querent::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Application`], [`Command`], [`Action`], [`Subscription`], [`Runtime`] - the TEA host
//! - [`QueryClient`], [`QueryKey`], [`query_key!`](crate::query_key) - the cache and its keys
//! - [`QueryOptions`], [`QueryResult`], [`QueryStatus`], [`QueryError`] - query configuration and state
//! - [`Query`] - a query observer as a subscription
//! - [`Mutation`], [`MutationState`] - writes
//! - [`ApiClient`] - the fetch adapter

pub use crate::application::Application;
pub use crate::command::{Action, Command};
pub use crate::http::ApiClient;
pub use crate::query::{
    Mutation, MutationState, Query, QueryClient, QueryError, QueryKey, QueryOptions, QueryResult,
    QueryStatus,
};
pub use crate::query_key;
pub use crate::runtime::Runtime;
pub use crate::subscription::Subscription;
