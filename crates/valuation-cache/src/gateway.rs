//! The report cache gateway.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use valuation_core::{CacheError, CacheKey, MetricsReport, ReportStore, StoredReport};

use crate::memory::InMemoryReportStore;
use crate::noop::NoopReportStore;

/// Thin boundary between the analysis pipeline and a [`ReportStore`].
///
/// Performs no computation. An expired entry is indistinguishable from a
/// missing one, and store failures degrade to misses with a warning.
#[derive(Debug, Clone)]
pub struct ReportCache {
    store: Arc<dyn ReportStore>,
}

impl ReportCache {
    /// Wraps a store.
    #[must_use]
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// A cache over a fresh [`InMemoryReportStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryReportStore::new()))
    }

    /// A cache that never hits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopReportStore::new()))
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    /// Returns the cached report if present and not expired.
    pub async fn get(&self, key: &CacheKey) -> Option<MetricsReport> {
        self.get_at(key, Utc::now()).await
    }

    /// Like [`get`](Self::get), judging expiry at `now`.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<MetricsReport> {
        match self.store.load(key).await {
            Ok(Some(entry)) if !entry.is_expired(now) => {
                debug!(ticker = %entry.report.ticker, "report cache hit");
                Some(entry.report)
            }
            Ok(Some(_)) => {
                debug!("report cache entry expired");
                None
            }
            Ok(None) => {
                debug!("report cache miss");
                None
            }
            Err(e) => {
                warn!(error = %e, "report cache read failed");
                None
            }
        }
    }

    /// Stores a report for `ttl`.
    #[instrument(skip(self, key, report), fields(key = %key, ticker = %report.ticker))]
    pub async fn put(&self, key: &CacheKey, report: MetricsReport, ttl: Duration) {
        if let Err(e) = self.store.store(key, StoredReport::new(report, ttl)).await {
            warn!(error = %e, "report cache write failed");
        }
    }

    /// Removes every expired entry from the store.
    ///
    /// # Errors
    /// Propagates the store's error.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        self.store.purge_expired(Utc::now()).await
    }

    /// Removes every entry from the store.
    ///
    /// # Errors
    /// Propagates the store's error.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.store.clear().await
    }
}

impl Default for ReportCache {
    fn default() -> Self {
        Self::in_memory()
    }
}
