use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::patch::{self, PatchOperation};
use super::{Method, Request, Response, Transport};
use crate::query::QueryError;

/// JSON client used inside query and mutation functions.
///
/// Every request method returns a `'static` future, so a clone of the
/// client can be moved into a fetcher closure:
///
/// ```
/// use querent::http::{ApiClient, Method, MockTransport};
/// use querent::query::{QueryClient, QueryOptions};
/// use querent::query_key;
/// use serde_json::json;
///
/// # async fn demo() {
/// let transport = MockTransport::new();
/// transport.respond(Method::Get, "/treatments", 200, json!(["massage", "facial"]));
/// let api = ApiClient::new(transport);
///
/// let client = QueryClient::new();
/// let treatments = client
///     .fetch_query(
///         &query_key!["treatments"],
///         move || api.get::<Vec<String>>("/treatments"),
///         &QueryOptions::new(),
///     )
///     .await;
/// assert_eq!(treatments.map(|t| t.len()), Ok(2));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    headers: Vec<(String, String)>,
    patch_envelope: Option<String>,
}

impl ApiClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            headers: Vec::new(),
            patch_envelope: Some("patch".to_string()),
        }
    }

    /// Client for a REST server at `base_url` using reqwest.
    #[cfg(feature = "http")]
    pub fn http(base_url: impl Into<String>) -> Self {
        Self::new(super::HttpTransport::new(base_url))
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    /// Sets the key PATCH operations are wrapped in (`"patch"` by default).
    #[must_use]
    pub fn patch_with(mut self, envelope: impl Into<String>) -> Self {
        self.patch_envelope = Some(envelope.into());
        self
    }

    /// Sends PATCH operations as a bare JSON array.
    #[must_use]
    pub fn patch_unwrapped(mut self) -> Self {
        self.patch_envelope = None;
        self
    }

    /// Sends a request and returns the JSON body of a 2xx response.
    ///
    /// Non-2xx responses become `NetworkError` with the status code;
    /// transport failures become `NetworkError` without one.
    pub fn request(
        &self,
        method: Method,
        path: impl Into<String>,
        body: Option<Value>,
    ) -> BoxFuture<'static, Result<Value, QueryError>> {
        let request = Request {
            method,
            path: path.into(),
            headers: self.headers.clone(),
            body,
        };
        let transport = Arc::clone(&self.transport);

        async move {
            tracing::debug!(%method, path = %request.path, "sending request");
            let path = request.path.clone();
            let response = transport.send(request).await.inspect_err(|err| {
                tracing::debug!(%method, %path, error = %err, "request failed");
            })?;
            if response.is_success() {
                Ok(response.body)
            } else {
                tracing::debug!(%method, %path, status = response.status, "request rejected");
                Err(QueryError::status(
                    response.status,
                    error_message(method, &path, &response),
                ))
            }
        }
        .boxed()
    }

    /// `GET path`, decoded into `T`.
    pub fn get<T>(&self, path: impl Into<String>) -> BoxFuture<'static, Result<T, QueryError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        decode(self.request(Method::Get, path, None))
    }

    /// `PATCH path` with JSON-patch operations, decoded into `T`.
    ///
    /// Operations are validated first; invalid input fails with
    /// `ValidationError` without sending anything.
    pub fn patch<T>(
        &self,
        path: impl Into<String>,
        operations: Vec<PatchOperation>,
    ) -> BoxFuture<'static, Result<T, QueryError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if let Err(err) = patch::validate(&operations) {
            return future::ready(Err(err)).boxed();
        }
        let operations = Value::Array(
            operations
                .into_iter()
                .map(PatchOperation::into_value)
                .collect(),
        );
        let body = match &self.patch_envelope {
            Some(envelope) => {
                let mut wrapped = Map::new();
                wrapped.insert(envelope.clone(), operations);
                Value::Object(wrapped)
            }
            None => operations,
        };
        decode(self.request(Method::Patch, path, Some(body)))
    }
}

fn decode<T>(
    response: BoxFuture<'static, Result<Value, QueryError>>,
) -> BoxFuture<'static, Result<T, QueryError>>
where
    T: DeserializeOwned + Send + 'static,
{
    response
        .map(|body| -> Result<T, QueryError> { Ok(serde_json::from_value(body?)?) })
        .boxed()
}

fn error_message(method: Method, path: &str, response: &Response) -> String {
    match &response.body {
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| format!("{method} {path}"), ToString::to_string),
        Value::String(text) if !text.is_empty() => text.clone(),
        _ => format!("{method} {path}"),
    }
}
