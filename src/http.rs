//! Fetch adapter: JSON over HTTP for query and mutation functions.
//!
//! [`ApiClient`] turns `request(method, path, body)` calls into JSON values,
//! mapping non-2xx responses to [`QueryError::NetworkError`]. The actual I/O
//! goes through a [`Transport`]: [`HttpTransport`] with reqwest (the `http`
//! feature) or [`MockTransport`] for tests and offline demos.

mod client;
pub mod mock;
pub mod patch;
#[cfg(feature = "http")]
mod transport;

use std::fmt;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::query::QueryError;

pub use client::ApiClient;
pub use mock::MockTransport;
pub use patch::{PatchOp, PatchOperation};
#[cfg(feature = "http")]
pub use transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as seen by a [`Transport`]. `path` is relative to the
/// transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Value of the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response with its body already parsed. An empty body is `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Sends requests somewhere.
///
/// Implementations return `Err` only when no response was received;
/// HTTP error statuses come back as a [`Response`].
pub trait Transport: Send + Sync + fmt::Debug {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Response, QueryError>>;
}
