//! Client configuration.
//!
//! SEC fair-use policy requires every request to identify the caller with a
//! User-Agent of the form `"Company Name contact@example.com"` and caps
//! traffic at ten requests per second. [`EdgarConfig`] refuses to build
//! without the identifying header.

use std::time::Duration;
use valuation_core::ConfigError;

/// SEC structured-data API base URL.
pub const SEC_DATA_BASE_URL: &str = "https://data.sec.gov";

/// SEC ticker directory URL.
pub const SEC_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// Default request rate, under the documented ceiling of 10 per second.
pub const DEFAULT_RATE_LIMIT: u32 = 8;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry behaviour of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Backoff baseline before the first retry.
    pub initial_backoff: Duration,
    /// Factor applied to the baseline after each retry.
    pub multiplier: u32,
    /// Upper bound on the baseline.
    pub max_backoff: Duration,
    /// Whether to apply +/- 50% jitter to transient-failure delays.
    pub jitter: bool,
    /// Upper bound on an honoured `Retry-After` hint.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
            max_backoff: Duration::from_secs(30),
            jitter: true,
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Returns the baseline after `current`, capped at `max_backoff`.
    #[must_use]
    pub fn next_baseline(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.multiplier.max(1))
            .min(self.max_backoff)
    }

    /// Applies jitter to a baseline delay.
    #[must_use]
    pub fn jittered(&self, baseline: Duration) -> Duration {
        if !self.jitter {
            return baseline;
        }
        let millis = u64::try_from(baseline.as_millis()).unwrap_or(u64::MAX / 2);
        let half = millis / 2;
        let offset = fastrand::u64(0..=half * 2);
        Duration::from_millis(millis - half + offset)
    }

    /// Caps a server-provided `Retry-After` hint.
    #[must_use]
    pub fn clamp_retry_after(&self, hint: Duration) -> Duration {
        hint.min(self.max_retry_after)
    }
}

/// Configuration for the SEC client.
#[derive(Debug, Clone)]
pub struct EdgarConfig {
    user_agent: String,
    rate_limit: u32,
    timeout: Duration,
    retry: RetryPolicy,
    data_base_url: String,
    tickers_url: String,
}

impl EdgarConfig {
    /// Creates a configuration with defaults for everything but the User-Agent.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the User-Agent is blank or has no contact
    /// address.
    pub fn new(user_agent: impl Into<String>) -> Result<Self, ConfigError> {
        Self::builder(user_agent).build()
    }

    /// Starts a builder.
    pub fn builder(user_agent: impl Into<String>) -> EdgarConfigBuilder {
        EdgarConfigBuilder::new(user_agent)
    }

    /// Reads the configuration from the process environment.
    ///
    /// Recognized variables: `EDGAR_USER_AGENT` (required),
    /// `EDGAR_RATE_LIMIT`, `EDGAR_TIMEOUT_SECS`, `EDGAR_MAX_ATTEMPTS`,
    /// `EDGAR_BASE_URL` and `EDGAR_TICKERS_URL`. Callers that want `.env`
    /// support load it first.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the User-Agent is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user_agent = lookup("EDGAR_USER_AGENT").ok_or(ConfigError::MissingUserAgent)?;
        let mut builder = Self::builder(user_agent);

        if let Some(raw) = lookup("EDGAR_RATE_LIMIT") {
            builder = builder.with_rate_limit(parse_number("EDGAR_RATE_LIMIT", &raw)?);
        }
        if let Some(raw) = lookup("EDGAR_TIMEOUT_SECS") {
            let secs: u64 = parse_number("EDGAR_TIMEOUT_SECS", &raw)?;
            builder = builder.with_timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = lookup("EDGAR_MAX_ATTEMPTS") {
            let attempts: u32 = parse_number("EDGAR_MAX_ATTEMPTS", &raw)?;
            builder = builder.with_retry_policy(RetryPolicy {
                max_attempts: attempts,
                ..RetryPolicy::default()
            });
        }
        if let Some(url) = lookup("EDGAR_BASE_URL") {
            builder = builder.with_data_base_url(url);
        }
        if let Some(url) = lookup("EDGAR_TICKERS_URL") {
            builder = builder.with_tickers_url(url);
        }

        builder.build()
    }

    /// Identifying User-Agent sent on every request.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Requests per second.
    #[must_use]
    pub const fn rate_limit(&self) -> u32 {
        self.rate_limit
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Base URL of the structured-data API.
    #[must_use]
    pub fn data_base_url(&self) -> &str {
        &self.data_base_url
    }

    /// URL of the ticker directory.
    #[must_use]
    pub fn tickers_url(&self) -> &str {
        &self.tickers_url
    }

    /// URL of the company-facts document for a zero-padded CIK.
    #[must_use]
    pub fn company_facts_url(&self, cik: &str) -> String {
        format!("{}/api/xbrl/companyfacts/CIK{}.json", self.data_base_url, cik)
    }
}

/// Builder for [`EdgarConfig`].
#[derive(Debug, Clone)]
pub struct EdgarConfigBuilder {
    user_agent: String,
    rate_limit: u32,
    timeout: Duration,
    retry: RetryPolicy,
    data_base_url: String,
    tickers_url: String,
}

impl EdgarConfigBuilder {
    fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            rate_limit: DEFAULT_RATE_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            data_base_url: SEC_DATA_BASE_URL.to_string(),
            tickers_url: SEC_TICKERS_URL.to_string(),
        }
    }

    /// Sets the request rate per second.
    #[must_use]
    pub const fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.rate_limit = per_second;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the structured-data API base URL.
    #[must_use]
    pub fn with_data_base_url(mut self, url: impl Into<String>) -> Self {
        self.data_base_url = url.into();
        self
    }

    /// Overrides the ticker directory URL.
    #[must_use]
    pub fn with_tickers_url(mut self, url: impl Into<String>) -> Self {
        self.tickers_url = url.into();
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on a missing or anonymous User-Agent, a zero
    /// rate, a zero timeout or a zero attempt budget.
    pub fn build(self) -> Result<EdgarConfig, ConfigError> {
        let user_agent = self.user_agent.trim().to_string();
        if user_agent.is_empty() {
            return Err(ConfigError::MissingUserAgent);
        }
        if !user_agent.contains('@') {
            return Err(ConfigError::InvalidUserAgent(user_agent));
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit",
                reason: "must be at least 1 request per second".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timeout",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(EdgarConfig {
            user_agent,
            rate_limit: self.rate_limit,
            timeout: self.timeout,
            retry: self.retry,
            data_base_url: self.data_base_url.trim_end_matches('/').to_string(),
            tickers_url: self.tickers_url,
        })
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        field,
        reason: e.to_string(),
    })
}
