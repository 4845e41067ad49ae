use thiserror::Error;

/// Error type for query and mutation operations.
///
/// Errors are cloned into every observer of a failed query, so the type is
/// `Clone` and carries rendered messages instead of source errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The request reached the server and came back with a non-2xx status,
    /// or never reached it (`status` is `None` for transport failures).
    #[error("{}", network_message(.status, .message))]
    NetworkError {
        status: Option<u16>,
        message: String,
    },

    /// The fetch function failed for a reason of its own.
    #[error("Fetch failed: {0}")]
    FetchError(String),

    /// The response body did not match the expected shape.
    #[error("Decode failed: {0}")]
    DecodeError(String),

    /// Input rejected before any request was sent (e.g. a malformed patch).
    #[error("Invalid input: {0}")]
    ValidationError(String),
}

fn network_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Request failed with status {code}: {message}"),
        None => format!("Network error: {message}"),
    }
}

impl QueryError {
    /// Creates a `NetworkError` for an HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::NetworkError {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a `NetworkError` for a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::NetworkError {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status code, when the error came from a response.
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::NetworkError { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a failed query should be attempted again.
    ///
    /// Decode and validation failures are never retried.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError { .. } | Self::FetchError(_))
    }

    /// Bare message without the variant prefix, used in notification titles.
    pub fn message(&self) -> &str {
        match self {
            Self::NetworkError { message, .. }
            | Self::FetchError(message)
            | Self::DecodeError(message)
            | Self::ValidationError(message) => message,
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::DecodeError(err.to_string())
    }
}
