//! Rate-limited HTTP client with retry.
//!
//! Every attempt, first or retried, takes a fresh permit from the shared
//! [`RateLimiter`]. Failures are classified as:
//!
//! - **transient** (5xx, 408, timeout, connect/reset, truncated body):
//!   retried after a jittered exponential backoff
//! - **throttled** (429): retried after the server's `Retry-After` hint, or
//!   after doubling the backoff baseline when no hint is given
//! - **terminal** (404, 400, any other status): returned immediately

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use valuation_core::{ConfigError, FetchError};

use crate::config::{EdgarConfig, RetryPolicy};
use crate::limiter::{RateLimiter, TokenBucket};

/// An outbound GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: String,
}

impl Request {
    /// Creates a GET request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// A successful response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    url: String,
    body: Vec<u8>,
}

impl RawPayload {
    /// Wraps a body fetched from `url`.
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    /// URL the payload came from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    /// Returns the decoder error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

enum Failure {
    Transient(String),
    Throttled(Option<Duration>),
    Terminal(FetchError),
}

/// HTTP client that enforces the shared rate limit and retry policy.
///
/// Cloning is cheap and clones share both the connection pool and the limiter.
#[derive(Debug, Clone)]
pub struct RateLimitedClient {
    http: reqwest::Client,
    limiter: Arc<dyn RateLimiter>,
    retry: RetryPolicy,
}

impl RateLimitedClient {
    /// Creates a client with its own [`TokenBucket`] at the configured rate.
    ///
    /// # Errors
    /// Returns [`ConfigError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &EdgarConfig) -> Result<Self, ConfigError> {
        let limiter: Arc<dyn RateLimiter> = Arc::new(TokenBucket::new(config.rate_limit()));
        Self::with_limiter(config, limiter)
    }

    /// Creates a client drawing from an existing limiter.
    ///
    /// # Errors
    /// Returns [`ConfigError::Client`] if the HTTP client cannot be built.
    pub fn with_limiter(
        config: &EdgarConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            http,
            limiter,
            retry: config.retry().clone(),
        })
    }

    /// The shared limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    /// Sends a request, retrying transient failures.
    ///
    /// # Errors
    /// - [`FetchError::NotFound`] / [`FetchError::BadRequest`] /
    ///   [`FetchError::Rejected`] for terminal statuses, without retry
    /// - [`FetchError::RateLimited`] if every attempt was answered with 429
    /// - [`FetchError::RetriesExhausted`] if transient failures outlast the budget
    #[instrument(skip(self, request), fields(url = %request.url()))]
    pub async fn send(&self, request: &Request) -> Result<RawPayload, FetchError> {
        let url = request.url();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut baseline = self.retry.initial_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.acquire().await;
            debug!(attempt, "dispatching request");

            let failure = match self.http.get(url).header(ACCEPT, "application/json").send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.bytes().await {
                            Ok(body) => return Ok(RawPayload::new(url, body.to_vec())),
                            Err(e) => Failure::Transient(format!("reading body: {e}")),
                        }
                    } else {
                        classify_status(url, status, response.headers())
                    }
                }
                Err(e) if e.is_builder() => {
                    return Err(FetchError::InvalidRequest(e.to_string()));
                }
                Err(e) => Failure::Transient(e.to_string()),
            };

            match failure {
                Failure::Terminal(err) => {
                    debug!(attempt, error = %err, "terminal failure");
                    return Err(err);
                }
                Failure::Transient(reason) => {
                    if attempt >= max_attempts {
                        warn!(attempt, %reason, "retry budget exhausted");
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last_error: reason,
                        });
                    }
                    let delay = self.retry.jittered(baseline);
                    warn!(attempt, %reason, ?delay, "transient failure, retrying");
                    sleep(delay).await;
                    baseline = self.retry.next_baseline(baseline);
                }
                Failure::Throttled(hint) => {
                    if attempt >= max_attempts {
                        warn!(attempt, "still throttled after retry budget");
                        return Err(FetchError::RateLimited {
                            url: url.to_string(),
                            attempts: attempt,
                            retry_after: hint,
                        });
                    }
                    let delay = match hint {
                        Some(hint) => self.retry.clamp_retry_after(hint),
                        None => {
                            baseline = self.retry.next_baseline(baseline);
                            baseline
                        }
                    };
                    warn!(attempt, ?delay, "throttled by upstream (429)");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Sends a request and decodes the JSON body.
    ///
    /// # Errors
    /// As [`send`](Self::send); an undecodable body becomes
    /// [`FetchError::InvalidRequest`].
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let payload = self.send(&Request::get(url)).await?;
        payload
            .json()
            .map_err(|e| FetchError::InvalidRequest(format!("undecodable body from {url}: {e}")))
    }
}

fn classify_status(url: &str, status: StatusCode, headers: &HeaderMap) -> Failure {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Failure::Throttled(
            headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now())),
        ),
        StatusCode::NOT_FOUND => Failure::Terminal(FetchError::NotFound {
            url: url.to_string(),
        }),
        StatusCode::BAD_REQUEST => Failure::Terminal(FetchError::BadRequest {
            url: url.to_string(),
        }),
        StatusCode::REQUEST_TIMEOUT => Failure::Transient(format!("HTTP {status}")),
        s if s.is_server_error() => Failure::Transient(format!("HTTP {status}")),
        s => Failure::Terminal(FetchError::Rejected {
            url: url.to_string(),
            status: s.as_u16(),
        }),
    }
}

/// Parses a `Retry-After` value: delay-seconds or an HTTP date.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some((at.with_timezone(&Utc) - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::Unlimited;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UA: &str = "Acme Research ops@acme.test";

    #[derive(Debug, Default)]
    struct CountingLimiter(AtomicUsize);

    #[async_trait]
    impl RateLimiter for CountingLimiter {
        async fn acquire(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(5),
            multiplier: 2,
            max_backoff: Duration::from_millis(40),
            jitter: false,
            max_retry_after: Duration::from_millis(50),
        }
    }

    fn client(limiter: Arc<dyn RateLimiter>, max_attempts: u32) -> RateLimitedClient {
        let config = EdgarConfig::builder(UA)
            .with_retry_policy(fast_retry(max_attempts))
            .build()
            .unwrap();
        RateLimitedClient::with_limiter(&config, limiter).unwrap()
    }

    #[tokio::test]
    async fn test_success_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/facts"))
            .and(header("user-agent", UA))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(Arc::new(Unlimited), 3);
        let payload = client
            .send(&Request::get(format!("{}/facts", server.uri())))
            .await
            .unwrap();
        assert_eq!(payload.body(), b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_server_errors_retried_with_fresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let limiter = Arc::new(CountingLimiter::default());
        let client = client(limiter.clone(), 5);
        client.send(&Request::get(server.uri())).await.unwrap();
        assert_eq!(limiter.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let limiter = Arc::new(CountingLimiter::default());
        let client = client(limiter.clone(), 5);
        let err = client.send(&Request::get(server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
        assert_eq!(limiter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_request_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(Arc::new(Unlimited), 5)
            .send(&Request::get(server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_other_client_error_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(Arc::new(Unlimited), 5)
            .send(&Request::get(server.uri()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::Rejected {
                url: server.uri(),
                status: 403
            }
        );
    }

    #[tokio::test]
    async fn test_persistent_server_error_exhausts_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(Arc::new(Unlimited), 3)
            .send(&Request::get(server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_throttle_honours_retry_after_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let limiter = Arc::new(CountingLimiter::default());
        let client = client(limiter.clone(), 3);
        client.send(&Request::get(server.uri())).await.unwrap();
        assert_eq!(limiter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_throttle_reports_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(Arc::new(Unlimited), 2)
            .send(&Request::get(server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::RateLimited {
                attempts: 2,
                retry_after: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let limiter = Arc::new(CountingLimiter::default());
        let err = client(limiter.clone(), 2)
            .send(&Request::get("http://127.0.0.1:1/unreachable"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(limiter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_json_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"n\":42}"))
            .mount(&server)
            .await;

        let value: serde_json::Value = client(Arc::new(Unlimited), 1)
            .get_json(&server.uri())
            .await
            .unwrap();
        assert_eq!(value["n"], 42);
    }

    #[test]
    fn test_parse_retry_after() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        assert_eq!(parse_retry_after("5", now), Some(Duration::from_secs(5)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }
}
