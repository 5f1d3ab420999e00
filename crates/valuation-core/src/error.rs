//! Error types for fetching, parsing and valuing filings.
//!
//! Each layer has its own enum: [`FetchError`] for the HTTP client,
//! [`ParseError`] for the filing parser, [`ResolveError`] for ticker
//! resolution, [`ValuationError`] for assumption validation, [`ConfigError`]
//! for client configuration, [`CacheError`] for the persistence collaborator
//! and [`MarketDataError`] for the secondary provider. [`FetchFailure`] is the
//! orchestrator-level outcome and [`AnalysisError`] the pipeline-level one.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the rate-limited HTTP client.
///
/// Transient failures are retried inside the client and only appear here once
/// the retry budget is spent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The upstream does not know the requested resource (HTTP 404).
    #[error("not found: {url}")]
    NotFound {
        /// Requested URL.
        url: String,
    },

    /// The upstream rejected the request as malformed (HTTP 400).
    #[error("bad request: {url}")]
    BadRequest {
        /// Requested URL.
        url: String,
    },

    /// Any other client error status; never retried.
    #[error("request to {url} rejected with status {status}")]
    Rejected {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The upstream kept answering 429 until the retry budget ran out.
    #[error("rate limited by upstream after {attempts} attempts: {url}")]
    RateLimited {
        /// Requested URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Last retry-after hint seen, if any.
        retry_after: Option<Duration>,
    },

    /// Transient failures persisted through every attempt.
    #[error("giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Requested URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Description of the final failure.
        last_error: String,
    },

    /// The request could not be built or sent for a non-transient reason.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors from the filing parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The payload's top-level shape is not the expected container format.
    #[error("malformed filing payload: {0}")]
    MalformedStructure(String),
}

/// Errors from ticker resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The ticker is not in the regulator's directory.
    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    /// The directory itself could not be fetched.
    #[error("ticker directory unavailable: {0}")]
    Directory(#[from] FetchError),

    /// The directory payload could not be read.
    #[error("ticker directory malformed: {0}")]
    MalformedDirectory(String),
}

/// Errors from valuation input validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValuationError {
    /// The DCF assumptions cannot produce a convergent result.
    #[error("invalid assumptions: {0}")]
    InvalidAssumptions(String),
}

/// Client configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No identifying User-Agent was configured.
    #[error("an identifying User-Agent (\"Company Name contact@example.com\") is required")]
    MissingUserAgent,

    /// The User-Agent does not carry a contact address.
    #[error("User-Agent {0:?} must include a contact e-mail address")]
    InvalidUserAgent(String),

    /// A numeric or URL setting is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Setting name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Errors from the report persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored report could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors from the secondary market-data provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// The provider has no data for the symbol.
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// The provider throttled the request.
    #[error("rate limited by {provider}")]
    RateLimited {
        /// Provider name.
        provider: String,
    },

    /// Transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// Response did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Terminal outcome of a failed fetch.
///
/// Each variant has a stable machine-readable [`reason`](Self::reason) and a
/// distinct process [`exit_code`](Self::exit_code) so that an out-of-process
/// caller can tell them apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The ticker could not be mapped to a regulator identifier.
    #[error("no data for {ticker}: {message}")]
    ResolutionFailed {
        /// Requested ticker.
        ticker: String,
        /// Detail.
        message: String,
    },

    /// The upstream was unreachable or throttled past the retry budget.
    #[error("data for {ticker} temporarily unavailable: {message}")]
    FetchFailed {
        /// Requested ticker.
        ticker: String,
        /// Detail.
        message: String,
    },

    /// The upstream payload shape was not recognized.
    #[error("unexpected data format for {ticker}: {message}")]
    ParseFailed {
        /// Requested ticker.
        ticker: String,
        /// Detail.
        message: String,
    },

    /// The caller cancelled the fetch.
    #[error("fetch for {ticker} cancelled")]
    Cancelled {
        /// Requested ticker.
        ticker: String,
    },
}

impl FetchFailure {
    /// Exit code for a resolution failure.
    pub const EXIT_RESOLUTION: i32 = 10;
    /// Exit code for a fetch failure.
    pub const EXIT_FETCH: i32 = 11;
    /// Exit code for a parse failure.
    pub const EXIT_PARSE: i32 = 12;
    /// Exit code for a configuration error (not a `FetchFailure` variant).
    pub const EXIT_CONFIG: i32 = 13;
    /// Exit code for a cancelled fetch.
    pub const EXIT_CANCELLED: i32 = 14;

    /// Machine-readable reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::ResolutionFailed { .. } => "resolution_failed",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::ParseFailed { .. } => "parse_failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ResolutionFailed { .. } => Self::EXIT_RESOLUTION,
            Self::FetchFailed { .. } => Self::EXIT_FETCH,
            Self::ParseFailed { .. } => Self::EXIT_PARSE,
            Self::Cancelled { .. } => Self::EXIT_CANCELLED,
        }
    }

    /// Ticker the failure is about.
    #[must_use]
    pub fn ticker(&self) -> &str {
        match self {
            Self::ResolutionFailed { ticker, .. }
            | Self::FetchFailed { ticker, .. }
            | Self::ParseFailed { ticker, .. }
            | Self::Cancelled { ticker } => ticker,
        }
    }

    /// Rebuilds a failure from a fetcher process exit code.
    ///
    /// Unknown codes (including the configuration code) become
    /// [`FetchFailure::FetchFailed`].
    #[must_use]
    pub fn from_exit(code: i32, ticker: impl Into<String>, message: impl Into<String>) -> Self {
        let ticker = ticker.into();
        let message = message.into();
        match code {
            Self::EXIT_RESOLUTION => Self::ResolutionFailed { ticker, message },
            Self::EXIT_PARSE => Self::ParseFailed { ticker, message },
            Self::EXIT_CANCELLED => Self::Cancelled { ticker },
            _ => Self::FetchFailed { ticker, message },
        }
    }

    /// Maps a resolution error for `ticker`.
    #[must_use]
    pub fn from_resolve(ticker: &str, err: ResolveError) -> Self {
        match err {
            ResolveError::UnknownTicker(_) => Self::ResolutionFailed {
                ticker: ticker.to_string(),
                message: err.to_string(),
            },
            ResolveError::Directory(_) | ResolveError::MalformedDirectory(_) => Self::FetchFailed {
                ticker: ticker.to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Maps a client error for `ticker`.
    #[must_use]
    pub fn from_fetch(ticker: &str, err: FetchError) -> Self {
        Self::FetchFailed {
            ticker: ticker.to_string(),
            message: err.to_string(),
        }
    }

    /// Maps a parser error for `ticker`.
    #[must_use]
    pub fn from_parse(ticker: &str, err: ParseError) -> Self {
        Self::ParseFailed {
            ticker: ticker.to_string(),
            message: err.to_string(),
        }
    }
}

/// Pipeline-level failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Assumptions rejected before any fetch.
    #[error(transparent)]
    Valuation(#[from] ValuationError),

    /// The primary fetch failed and no fallback applied.
    #[error(transparent)]
    Fetch(#[from] FetchFailure),
}

/// Result type alias using [`FetchError`].
pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let failures = [
            FetchFailure::ResolutionFailed { ticker: "X".into(), message: String::new() },
            FetchFailure::FetchFailed { ticker: "X".into(), message: String::new() },
            FetchFailure::ParseFailed { ticker: "X".into(), message: String::new() },
            FetchFailure::Cancelled { ticker: "X".into() },
        ];
        let mut codes: Vec<_> = failures.iter().map(FetchFailure::exit_code).collect();
        codes.push(FetchFailure::EXIT_CONFIG);
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 5);
        assert!(codes.iter().all(|c| *c != 0 && *c != 1 && *c != 2));
    }

    #[test]
    fn test_from_exit_round_trip() {
        for failure in [
            FetchFailure::ResolutionFailed { ticker: "ACME".into(), message: "m".into() },
            FetchFailure::FetchFailed { ticker: "ACME".into(), message: "m".into() },
            FetchFailure::ParseFailed { ticker: "ACME".into(), message: "m".into() },
        ] {
            let rebuilt = FetchFailure::from_exit(failure.exit_code(), "ACME", "m");
            assert_eq!(rebuilt, failure);
            assert_eq!(rebuilt.reason(), failure.reason());
        }
        assert!(matches!(
            FetchFailure::from_exit(101, "ACME", "panic"),
            FetchFailure::FetchFailed { .. }
        ));
    }

    #[test]
    fn test_resolve_mapping() {
        let unknown = FetchFailure::from_resolve("ZZZZ", ResolveError::UnknownTicker("ZZZZ".into()));
        assert_eq!(unknown.reason(), "resolution_failed");

        let outage = FetchFailure::from_resolve(
            "ACME",
            ResolveError::Directory(FetchError::RetriesExhausted {
                url: "u".into(),
                attempts: 5,
                last_error: "503".into(),
            }),
        );
        assert_eq!(outage.reason(), "fetch_failed");
        assert_eq!(outage.ticker(), "ACME");
    }
}
