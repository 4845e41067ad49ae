//! In-memory [`Transport`] for tests and offline demos.
//!
//! Routes are matched on method and exact path. Unknown routes answer 404.
//! Every request is recorded, so tests can assert how many network calls
//! the cache actually made.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};

use super::{Method, Request, Response, Transport};
use crate::query::QueryError;

type Handler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

#[derive(Clone)]
enum Reply {
    Respond(Response),
    Fail(String),
    Handle(Handler),
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Respond(response) => f.debug_tuple("Respond").field(response).finish(),
            Self::Fail(message) => f.debug_tuple("Fail").field(message).finish(),
            Self::Handle(_) => f.write_str("Handle(..)"),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    routes: HashMap<(Method, String), Reply>,
    requests: Vec<Request>,
    latency: Duration,
}

/// A transport answering from a route table. Clones share the table and
/// the request log.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every response by `latency` (tokio time, so paused-clock
    /// tests stay deterministic).
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Answers `method path` with `status` and `body`, replacing any
    /// previous route.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.route(method, path, Reply::Respond(Response::new(status, body)))
    }

    /// Fails `method path` as if the connection broke.
    pub fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
        self.route(method, path, Reply::Fail(message.to_string()))
    }

    /// Answers `method path` by calling `handler` with the request.
    pub fn handle<F>(&self, method: Method, path: &str, handler: F) -> &Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.route(method, path, Reply::Handle(Arc::new(handler)))
    }

    /// Number of requests received for `method path`.
    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.lock().requests.last().cloned()
    }

    /// Forgets recorded requests, keeping the routes.
    pub fn reset_calls(&self) {
        self.lock().requests.clear();
    }

    fn route(&self, method: Method, path: &str, reply: Reply) -> &Self {
        self.lock().routes.insert((method, path.to_string()), reply);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Response, QueryError>> {
        let (reply, latency) = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            let reply = state
                .routes
                .get(&(request.method, request.path.clone()))
                .cloned();
            (reply, state.latency)
        };
        tracing::trace!(method = %request.method, path = %request.path, "mock request");

        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match reply {
                Some(Reply::Respond(response)) => Ok(response),
                Some(Reply::Fail(message)) => Err(QueryError::transport(message)),
                Some(Reply::Handle(handler)) => Ok(handler(&request)),
                None => Ok(Response::new(
                    404,
                    json!({"message": format!("no route for {} {}", request.method, request.path)}),
                )),
            }
        }
        .boxed()
    }
}
