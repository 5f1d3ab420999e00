//! Ticker to CIK resolution.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Debug;
use tokio::sync::OnceCell;
use tracing::debug;
use valuation_core::{EntityIdentifier, ResolveError, Symbol};

use crate::client::{RateLimitedClient, Request};

/// Maps a ticker to the regulator's entity identifier.
#[async_trait]
pub trait EntityResolver: Send + Sync + Debug {
    /// Resolves a ticker.
    ///
    /// # Errors
    /// [`ResolveError::UnknownTicker`] if the ticker is not listed; other
    /// variants if the directory itself is unavailable.
    async fn resolve(&self, ticker: &Symbol) -> Result<EntityIdentifier, ResolveError>;
}

/// Entry of the SEC `company_tickers.json` document.
#[derive(Debug, Deserialize)]
struct CompanyTickerInfo {
    /// CIK as a number (SEC returns this as an integer)
    cik_str: u64,
    ticker: String,
}

/// The SEC ticker directory, downloaded once through the shared client.
#[derive(Debug)]
pub struct TickerDirectory {
    client: RateLimitedClient,
    url: String,
    entries: OnceCell<HashMap<String, u64>>,
}

impl TickerDirectory {
    /// Creates a directory reading from `url` on first use.
    pub fn new(client: RateLimitedClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            entries: OnceCell::new(),
        }
    }

    async fn entries(&self) -> Result<&HashMap<String, u64>, ResolveError> {
        self.entries
            .get_or_try_init(|| async {
                debug!(url = %self.url, "fetching ticker directory");
                let payload = self.client.send(&Request::get(&self.url)).await?;
                let raw: HashMap<String, CompanyTickerInfo> = payload
                    .json()
                    .map_err(|e| ResolveError::MalformedDirectory(e.to_string()))?;
                let entries: HashMap<String, u64> = raw
                    .into_values()
                    .map(|info| (info.ticker.to_uppercase(), info.cik_str))
                    .collect();
                debug!(tickers = entries.len(), "ticker directory loaded");
                Ok::<_, ResolveError>(entries)
            })
            .await
    }
}

#[async_trait]
impl EntityResolver for TickerDirectory {
    async fn resolve(&self, ticker: &Symbol) -> Result<EntityIdentifier, ResolveError> {
        if ticker.is_empty() {
            return Err(ResolveError::UnknownTicker(String::new()));
        }
        let entries = self.entries().await?;
        lookup(entries, ticker)
    }
}

/// A fixed ticker to CIK table.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: HashMap<String, u64>,
}

impl StaticDirectory {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    #[must_use]
    pub fn with_entry(mut self, ticker: &str, cik: u64) -> Self {
        self.entries.insert(ticker.trim().to_uppercase(), cik);
        self
    }
}

impl<'a> FromIterator<(&'a str, u64)> for StaticDirectory {
    fn from_iter<I: IntoIterator<Item = (&'a str, u64)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |dir, (ticker, cik)| dir.with_entry(ticker, cik))
    }
}

#[async_trait]
impl EntityResolver for StaticDirectory {
    async fn resolve(&self, ticker: &Symbol) -> Result<EntityIdentifier, ResolveError> {
        lookup(&self.entries, ticker)
    }
}

/// Exact match first, then the class-share spelling SEC uses (`BRK.B` is
/// listed as `BRK-B`).
fn lookup(entries: &HashMap<String, u64>, ticker: &Symbol) -> Result<EntityIdentifier, ResolveError> {
    let exact = entries.get(ticker.as_str());
    let cik = exact
        .or_else(|| entries.get(&ticker.as_str().replace('.', "-")))
        .copied()
        .ok_or_else(|| ResolveError::UnknownTicker(ticker.to_string()))?;
    debug!(%ticker, cik, "resolved ticker");
    Ok(EntityIdentifier::new(ticker.clone(), cik))
}
