//! Collaborator traits of the valuation pipeline.
//!
//! - [`FetchOrchestrator`] - Turns a ticker into a filings series or a typed failure
//! - [`MarketDataProvider`] - Secondary fundamentals snapshot and price
//! - [`ReportStore`] - Persistence behind the report cache

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::CacheKey,
    error::{CacheError, FetchFailure, MarketDataError},
    report::MetricsReport,
    types::{CompanyFilings, FinancialSeries, Symbol},
};

/// Drives one ticker through resolve, fetch and parse.
///
/// Implementations may run in-process or invoke a separate fetcher
/// executable; callers cannot tell the difference.
#[async_trait]
pub trait FetchOrchestrator: Send + Sync + Debug {
    /// Returns the name of this orchestrator.
    fn name(&self) -> &str;

    /// Fetches and parses the filings for a ticker.
    async fn fetch(&self, ticker: &Symbol) -> Result<CompanyFilings, FetchFailure> {
        let cancel = CancellationToken::new();
        self.fetch_with_cancel(ticker, &cancel).await
    }

    /// Like [`fetch`](Self::fetch), aborting at the next state transition
    /// once `cancel` fires.
    async fn fetch_with_cancel(
        &self,
        ticker: &Symbol,
        cancel: &CancellationToken,
    ) -> Result<CompanyFilings, FetchFailure>;
}

/// Latest-period snapshot from a market-data provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Symbol the snapshot is for.
    pub symbol: Symbol,
    /// Current market price per share.
    pub price: Option<Decimal>,
    /// Currency of the price and monetary values.
    pub currency: Option<String>,
    /// Fundamentals, tagged as secondary.
    pub series: FinancialSeries,
}

/// Provider of market prices and gap-filling fundamentals.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + Debug {
    /// Returns the name of this provider.
    fn name(&self) -> &str;

    /// Fetches the latest snapshot for a symbol.
    async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot, MarketDataError>;
}

/// A persisted report with its time-to-live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReport {
    /// The cached report.
    pub report: MetricsReport,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
    /// How long the entry stays valid.
    pub ttl: Duration,
}

impl StoredReport {
    /// Creates an entry stored now.
    #[must_use]
    pub fn new(report: MetricsReport, ttl: Duration) -> Self {
        Self {
            report,
            stored_at: Utc::now(),
            ttl,
        }
    }

    /// Returns true once `ttl` has fully elapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Ok(age) = (now - self.stored_at).to_std() else {
            // stored_at lies in the future
            return false;
        };
        age >= self.ttl
    }
}

/// Key-value persistence for computed reports.
///
/// Stores are dumb: expiry is decided by the cache gateway, except for
/// [`purge_expired`](Self::purge_expired).
#[async_trait]
pub trait ReportStore: Send + Sync + Debug {
    /// Loads an entry, `Ok(None)` if absent.
    async fn load(&self, key: &CacheKey) -> Result<Option<StoredReport>, CacheError>;

    /// Writes an entry, replacing any previous one.
    async fn store(&self, key: &CacheKey, entry: StoredReport) -> Result<(), CacheError>;

    /// Removes an entry if present.
    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Removes every entry expired at `now`, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError>;

    /// Removes every entry.
    async fn clear(&self) -> Result<(), CacheError>;
}
