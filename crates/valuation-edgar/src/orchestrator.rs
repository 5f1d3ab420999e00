//! In-process fetch orchestration.
//!
//! A fetch walks an explicit state machine:
//!
//! ```text
//! Resolving -> Fetching -> Parsing -> Done
//!     |            |          |
//!     +------------+----------+-----> Failed
//! ```
//!
//! Nothing is retried across transitions; only the client retries its own
//! request attempts. Cancellation is observed between transitions and while
//! a step is in flight; an abandoned step never leaves the limiter holding
//! a half-issued permit.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use valuation_core::{
    CompanyFilings, ConfigError, EntityIdentifier, FetchFailure, FetchOrchestrator, Symbol,
};

use crate::client::{RateLimitedClient, RawPayload, Request};
use crate::config::EdgarConfig;
use crate::limiter::RateLimiter;
use crate::parser::parse_with_notes;
use crate::resolver::{EntityResolver, TickerDirectory};

/// State of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    /// Mapping the ticker to a CIK.
    Resolving {
        /// Requested ticker.
        ticker: Symbol,
    },
    /// Downloading the company-facts document.
    Fetching {
        /// Resolved entity.
        entity: EntityIdentifier,
    },
    /// Turning the document into a series.
    Parsing {
        /// Resolved entity.
        entity: EntityIdentifier,
        /// Downloaded document.
        payload: RawPayload,
    },
    /// Finished with a series.
    Done(CompanyFilings),
    /// Finished with a failure.
    Failed(FetchFailure),
}

impl FetchState {
    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Resolving { .. } => "resolving",
            Self::Fetching { .. } => "fetching",
            Self::Parsing { .. } => "parsing",
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
        }
    }

    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }
}

/// [`FetchOrchestrator`] running resolve, fetch and parse in this process.
#[derive(Debug, Clone)]
pub struct EdgarOrchestrator {
    config: EdgarConfig,
    client: RateLimitedClient,
    resolver: Arc<dyn EntityResolver>,
}

impl EdgarOrchestrator {
    /// Creates an orchestrator with its own limiter and the SEC ticker directory.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the HTTP client cannot be built.
    pub fn new(config: EdgarConfig) -> Result<Self, ConfigError> {
        let client = RateLimitedClient::new(&config)?;
        Ok(Self::with_client(config, client))
    }

    /// Creates an orchestrator drawing from a shared limiter.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the HTTP client cannot be built.
    pub fn with_limiter(
        config: EdgarConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ConfigError> {
        let client = RateLimitedClient::with_limiter(&config, limiter)?;
        Ok(Self::with_client(config, client))
    }

    fn with_client(config: EdgarConfig, client: RateLimitedClient) -> Self {
        let resolver = Arc::new(TickerDirectory::new(client.clone(), config.tickers_url()));
        Self {
            config,
            client,
            resolver,
        }
    }

    /// Replaces the ticker resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &RateLimitedClient {
        &self.client
    }

    /// Advances a non-terminal state by one transition.
    pub async fn step(&self, state: FetchState) -> FetchState {
        match state {
            FetchState::Resolving { ticker } => match self.resolver.resolve(&ticker).await {
                Ok(entity) => FetchState::Fetching { entity },
                Err(e) => FetchState::Failed(FetchFailure::from_resolve(ticker.as_str(), e)),
            },
            FetchState::Fetching { entity } => {
                let url = self.config.company_facts_url(entity.cik());
                match self.client.send(&Request::get(url)).await {
                    Ok(payload) => FetchState::Parsing { entity, payload },
                    Err(e) => {
                        FetchState::Failed(FetchFailure::from_fetch(entity.ticker().as_str(), e))
                    }
                }
            }
            FetchState::Parsing { entity, payload } => match parse_with_notes(&payload) {
                Ok(parsed) => {
                    debug!(
                        values = parsed.series.len(),
                        dropped = parsed.notes.len(),
                        "parsed filings"
                    );
                    let mut filings = CompanyFilings::new(entity, parsed.series);
                    if let Some(name) = parsed.entity_name {
                        filings = filings.with_entity_name(name);
                    }
                    FetchState::Done(filings)
                }
                Err(e) => {
                    warn!(target: "data_quality", cik = entity.cik(), error = %e, "unrecognized filings payload");
                    FetchState::Failed(FetchFailure::from_parse(entity.ticker().as_str(), e))
                }
            },
            terminal @ (FetchState::Done(_) | FetchState::Failed(_)) => terminal,
        }
    }
}

#[async_trait]
impl FetchOrchestrator for EdgarOrchestrator {
    fn name(&self) -> &str {
        "SEC EDGAR"
    }

    #[instrument(skip(self, ticker, cancel), fields(ticker = %ticker))]
    async fn fetch_with_cancel(
        &self,
        ticker: &Symbol,
        cancel: &CancellationToken,
    ) -> Result<CompanyFilings, FetchFailure> {
        let cancelled = || FetchFailure::Cancelled {
            ticker: ticker.to_string(),
        };
        let mut state = FetchState::Resolving {
            ticker: ticker.clone(),
        };

        loop {
            match state {
                FetchState::Done(filings) => return Ok(filings),
                FetchState::Failed(failure) => {
                    debug!(reason = failure.reason(), "fetch failed");
                    return Err(failure);
                }
                _ => {}
            }
            if cancel.is_cancelled() {
                debug!(state = state.name(), "fetch cancelled");
                return Err(cancelled());
            }

            let from = state.name();
            state = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(state = from, "fetch cancelled mid-step");
                    return Err(cancelled());
                }
                next = self.step(state) => next,
            };
            debug!(from, to = state.name(), "fetch transition");
        }
    }
}
