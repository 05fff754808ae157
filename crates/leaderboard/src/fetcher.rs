// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded-concurrency HTTP fetching with classified outcomes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;

/// Classified failure of a single fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchErrorKind {
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("upstream returned HTTP {0}")]
    HttpError(u16),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("failed to decode response body: {0}")]
    DecodeError(String),
}

/// Result of one fetch attempt: a JSON payload or a classified error, never
/// neither.
pub type FetchOutcome = Result<serde_json::Value, FetchErrorKind>;

/// HTTP caller with a hard cap on in-flight requests.
///
/// One fetcher instance is one permit pool. Callers talking to different
/// upstream classes hold different instances so one class cannot starve
/// another, while each class still respects its own provider limit. Every
/// call is a single attempt with a classified outcome; retry and backoff
/// policy stays with the caller.
pub struct RateLimitedFetcher {
    client: reqwest::Client,
    permits: Semaphore,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl RateLimitedFetcher {
    /// Build a fetcher allowing at most `max_concurrency` in-flight requests,
    /// each bounded by `timeout`.
    pub fn new(max_concurrency: usize, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            permits: Semaphore::new(max_concurrency),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    pub async fn get_json(&self, url: &str) -> FetchOutcome {
        self.execute(self.client.get(url)).await
    }

    pub async fn post_json(&self, url: &str, body: &serde_json::Value) -> FetchOutcome {
        self.execute(self.client.post(url).json(body)).await
    }

    /// Successful fetches since construction.
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Failed fetches since construction, regardless of error kind.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> FetchOutcome {
        // The permit is held until this function returns, on every path.
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return self.fail(FetchErrorKind::NetworkError("fetch pool closed".into())),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return self.fail(classify_transport_error(&err)),
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return self.fail(FetchErrorKind::RateLimited);
        }
        if !status.is_success() {
            return self.fail(FetchErrorKind::HttpError(status.as_u16()));
        }

        match response.json::<serde_json::Value>().await {
            Ok(payload) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                Ok(payload)
            }
            Err(err) if err.is_timeout() => self.fail(FetchErrorKind::Timeout),
            Err(err) => self.fail(FetchErrorKind::DecodeError(err.to_string())),
        }
    }

    fn fail(&self, kind: FetchErrorKind) -> FetchOutcome {
        self.failures.fetch_add(1, Ordering::Relaxed);
        Err(kind)
    }
}

fn classify_transport_error(err: &reqwest::Error) -> FetchErrorKind {
    if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if err.is_decode() {
        FetchErrorKind::DecodeError(err.to_string())
    } else {
        FetchErrorKind::NetworkError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn fetcher() -> RateLimitedFetcher {
        RateLimitedFetcher::new(4, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn successful_fetch_returns_payload_and_counts() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/stats");
                then.status(200).json_body(serde_json::json!({ "ok": true }));
            })
            .await;

        let fetcher = fetcher();
        let payload = fetcher.get_json(&server.url("/stats")).await.unwrap();

        assert_eq!(payload["ok"], serde_json::json!(true));
        assert_eq!(fetcher.successes(), 1);
        assert_eq!(fetcher.failures(), 0);
    }

    #[tokio::test]
    async fn http_429_classifies_as_rate_limited() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/stats");
                then.status(429);
            })
            .await;

        let fetcher = fetcher();
        let outcome = fetcher.get_json(&server.url("/stats")).await;

        assert_eq!(outcome, Err(FetchErrorKind::RateLimited));
        assert_eq!(fetcher.failures(), 1);
    }

    #[tokio::test]
    async fn other_statuses_carry_the_status_code() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/stats");
                then.status(503);
            })
            .await;

        let outcome = fetcher().get_json(&server.url("/stats")).await;
        assert_eq!(outcome, Err(FetchErrorKind::HttpError(503)));
    }

    #[tokio::test]
    async fn non_json_body_classifies_as_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/stats");
                then.status(200).body("not json");
            })
            .await;

        let outcome = fetcher().get_json(&server.url("/stats")).await;
        assert!(matches!(outcome, Err(FetchErrorKind::DecodeError(_))));
    }

    #[tokio::test]
    async fn unreachable_host_classifies_as_network_error() {
        // Reserved TEST-NET-1 address, nothing listens there.
        let fetcher = RateLimitedFetcher::new(1, Duration::from_millis(250)).unwrap();
        let outcome = fetcher.get_json("http://192.0.2.1:9/stats").await;

        assert!(matches!(
            outcome,
            Err(FetchErrorKind::NetworkError(_)) | Err(FetchErrorKind::Timeout)
        ));
        assert_eq!(fetcher.failures(), 1);
    }
}
