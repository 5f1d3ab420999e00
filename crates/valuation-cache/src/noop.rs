//! No-op report store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::trace;
use valuation_core::{CacheError, CacheKey, ReportStore, StoredReport};

/// A store that keeps nothing.
///
/// Every load misses and every write succeeds. Useful for disabling caching
/// without changing the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReportStore;

impl NoopReportStore {
    /// Create a new no-op store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReportStore for NoopReportStore {
    async fn load(&self, _key: &CacheKey) -> Result<Option<StoredReport>, CacheError> {
        trace!("NoopReportStore: load called, returning None");
        Ok(None)
    }

    async fn store(&self, _key: &CacheKey, _entry: StoredReport) -> Result<(), CacheError> {
        trace!("NoopReportStore: store called, doing nothing");
        Ok(())
    }

    async fn remove(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Ok(())
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, CacheError> {
        Ok(0)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
