// Shared helpers for integration tests
#![allow(dead_code)]

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use querent::http::{ApiClient, Method, MockTransport};
use querent::query::{QueryClient, QueryConfig, RetryPolicy};
use querent::subscription::{SubscriptionId, SubscriptionSource};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Emits `()` every `period_ms` milliseconds.
#[derive(Debug, Clone, Copy, Hash)]
pub struct Ticker {
    period_ms: u64,
}

impl Ticker {
    pub const fn new(period_ms: u64) -> Self {
        Self { period_ms }
    }
}

impl SubscriptionSource for Ticker {
    type Output = ();

    fn stream(&self) -> BoxStream<'static, ()> {
        let period = Duration::from_millis(self.period_ms);
        let interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        stream::unfold(interval, |mut interval| async move {
            interval.tick().await;
            Some(((), interval))
        })
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: i64,
    pub name: String,
    #[serde(rename = "treatmentNames")]
    pub treatment_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Client used by the integration tests: no retries so failures settle at
/// once, a minute of freshness, and no garbage collection surprises.
pub fn test_client() -> QueryClient {
    QueryClient::with_config(QueryConfig {
        retry: RetryPolicy::never(),
        ..QueryConfig::new(Duration::from_secs(60), Duration::from_secs(300))
    })
}

/// A mock server with the lazy-days fixtures.
pub fn lazy_days_server() -> MockTransport {
    let transport = MockTransport::new();
    transport
        .respond(
            Method::Get,
            "/staff",
            200,
            json!([
                {"id": 1, "name": "Divya", "treatmentNames": ["facial", "scrub"]},
                {"id": 2, "name": "Sandra", "treatmentNames": ["facial", "massage"]},
                {"id": 3, "name": "Michael", "treatmentNames": ["facial", "scrub", "massage"]},
                {"id": 4, "name": "Mateo", "treatmentNames": ["massage"]},
            ]),
        )
        .respond(
            Method::Get,
            "/treatments",
            200,
            json!([
                {"id": 1, "name": "massage"},
                {"id": 2, "name": "facial"},
                {"id": 3, "name": "scrub"},
            ]),
        )
        .respond(
            Method::Get,
            "/user/1",
            200,
            json!({"user": {"id": 1, "name": "Ann", "email": "ann@example.com"}}),
        );
    transport
}

pub fn api(transport: &MockTransport) -> ApiClient {
    ApiClient::new(transport.clone())
}
