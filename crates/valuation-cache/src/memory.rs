//! In-memory report store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use valuation_core::{CacheError, CacheKey, ReportStore, StoredReport};

/// Report store backed by a `RwLock`-protected `HashMap`.
///
/// Entries are lost when the store is dropped. Reports are cloned on load.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    entries: RwLock<HashMap<CacheKey, StoredReport>>,
}

impl InMemoryReportStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    #[instrument(skip(self, key), fields(key = %key))]
    async fn load(&self, key: &CacheKey) -> Result<Option<StoredReport>, CacheError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) => {
                debug!("Found stored report");
                Ok(Some(entry.clone()))
            }
            None => {
                debug!("No stored report");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, key, entry), fields(key = %key, ticker = %entry.report.ticker))]
    async fn store(&self, key: &CacheKey, entry: StoredReport) -> Result<(), CacheError> {
        self.entries.write().await.insert(key.clone(), entry);
        debug!("Stored report");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Purged {} expired reports", removed);
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        debug!("Cleared all stored reports");
        Ok(())
    }
}
