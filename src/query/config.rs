use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Duration value meaning "never" for `stale_time` and `gc_time`.
pub const INFINITE: Duration = Duration::MAX;

/// Retry behaviour for failed queries.
///
/// The delay before attempt `n + 1` is `min(base_delay * 2^n, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryPolicy {
    /// How many times a failed fetch is attempted again before the error
    /// is surfaced. `0` disables retries.
    pub max_retries: u32,
    #[serde(rename = "base_delay_ms", deserialize_with = "duration_ms")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", deserialize_with = "duration_ms")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that surfaces the first failure.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Backoff before the retry following failed attempt number `attempt`
    /// (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Default behaviour shared by all queries of a client.
///
/// This controls how queries cache data and when they consider it stale.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QueryConfig {
    /// How long data is considered fresh after a successful fetch.
    ///
    /// Fresh data is served without a request. Stale data is still served,
    /// but new subscribers and refetch triggers fetch it again.
    #[serde(rename = "stale_time_ms", deserialize_with = "duration_ms")]
    pub stale_time: Duration,

    /// How long an entry without subscribers stays cached before it is
    /// garbage collected.
    #[serde(rename = "gc_time_ms", deserialize_with = "duration_ms")]
    pub gc_time: Duration,

    pub retry: RetryPolicy,

    /// Refetch stale, observed queries when the window regains focus.
    pub refetch_on_window_focus: bool,

    /// Refetch stale, observed queries when the network comes back.
    pub refetch_on_reconnect: bool,

    /// Poll observed queries at this interval.
    #[serde(rename = "refetch_interval_ms", deserialize_with = "optional_duration_ms")]
    pub refetch_interval: Option<Duration>,

    /// Disabled queries never fetch on their own.
    pub enabled: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,              // immediately stale
            gc_time: Duration::from_secs(5 * 60), // 5 minutes
            retry: RetryPolicy::default(),
            refetch_on_window_focus: true,
            refetch_on_reconnect: true,
            refetch_interval: None,
            enabled: true,
        }
    }
}

impl QueryConfig {
    /// Creates a query configuration with the given stale and gc times.
    #[must_use]
    pub fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            stale_time,
            gc_time,
            ..Self::default()
        }
    }

    /// Applies per-query overrides on top of these defaults.
    #[must_use]
    pub fn merge(&self, options: &QueryOptions) -> Self {
        Self {
            stale_time: options.stale_time.unwrap_or(self.stale_time),
            gc_time: options.gc_time.unwrap_or(self.gc_time),
            retry: options.retry.unwrap_or(self.retry),
            refetch_on_window_focus: options
                .refetch_on_window_focus
                .unwrap_or(self.refetch_on_window_focus),
            refetch_on_reconnect: options
                .refetch_on_reconnect
                .unwrap_or(self.refetch_on_reconnect),
            refetch_interval: options.refetch_interval.or(self.refetch_interval),
            enabled: options.enabled.unwrap_or(self.enabled),
        }
    }
}

/// Per-query overrides of the client's [`QueryConfig`].
///
/// ```
/// use std::time::Duration;
/// use querent::query::QueryOptions;
///
/// let options = QueryOptions::new()
///     .stale_time(Duration::ZERO)
///     .gc_time(Duration::from_secs(30))
///     .refetch_interval(Duration::from_secs(60))
///     .refetch_on_window_focus(true);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Option<Duration>,
    pub gc_time: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    pub refetch_on_window_focus: Option<bool>,
    pub refetch_on_reconnect: Option<bool>,
    pub refetch_interval: Option<Duration>,
    pub enabled: Option<bool>,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    #[must_use]
    pub const fn gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = Some(gc_time);
        self
    }

    #[must_use]
    pub const fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub const fn refetch_on_window_focus(mut self, enabled: bool) -> Self {
        self.refetch_on_window_focus = Some(enabled);
        self
    }

    #[must_use]
    pub const fn refetch_on_reconnect(mut self, enabled: bool) -> Self {
        self.refetch_on_reconnect = Some(enabled);
        self
    }

    #[must_use]
    pub const fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// How failures are reported to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NotificationConfig {
    /// Stable id shared by all failure notifications; one notification per
    /// id is shown until the notifier is reset.
    pub error_id: String,
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            error_id: "query-error-toast".to_string(),
            enabled: true,
        }
    }
}

/// Top-level client configuration, loadable from TOML.
///
/// ```toml
/// [queries]
/// stale_time_ms = 600000
/// gc_time_ms = 900000
/// refetch_on_window_focus = false
///
/// [queries.retry]
/// max_retries = 3
///
/// [notifications]
/// error_id = "query-error-toast"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
    pub queries: QueryConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.queries.retry;
        if retry.max_retries > 0 && retry.base_delay.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "queries.retry.base_delay_ms",
                reason: "must be > 0 when retries are enabled".to_string(),
            });
        }
        if retry.max_delay < retry.base_delay {
            return Err(ConfigError::InvalidValue {
                field: "queries.retry.max_delay_ms",
                reason: "must be >= base_delay_ms".to_string(),
            });
        }
        if self.queries.refetch_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidValue {
                field: "queries.refetch_interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.notifications.error_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "notifications.error_id",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Milliseconds, or the string `"infinite"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Millis(u64),
    Keyword(String),
}

impl DurationRepr {
    fn into_duration<E: serde::de::Error>(self) -> Result<Duration, E> {
        match self {
            Self::Millis(ms) => Ok(Duration::from_millis(ms)),
            Self::Keyword(word) if word.eq_ignore_ascii_case("infinite") => Ok(INFINITE),
            Self::Keyword(word) => Err(E::custom(format!(
                "expected milliseconds or \"infinite\", got {word:?}"
            ))),
        }
    }
}

fn duration_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    DurationRepr::deserialize(deserializer)?.into_duration()
}

fn optional_duration_ms<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    duration_ms(deserializer).map(Some)
}
