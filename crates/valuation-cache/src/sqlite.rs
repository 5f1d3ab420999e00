//! SQLite-based report store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument};
use valuation_core::{CacheError, CacheKey, ReportStore, StoredReport};

/// SQLite-based report store.
///
/// Each entry is one row holding the JSON-encoded [`StoredReport`] and its
/// expiry instant in epoch milliseconds, so that purging is a single
/// indexed delete.
#[derive(Debug)]
pub struct SqliteReportStore {
    conn: Mutex<Connection>,
}

impl SqliteReportStore {
    /// Open (or create) a store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(storage)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), CacheError> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS report_cache (
                cache_key TEXT PRIMARY KEY NOT NULL,
                ticker TEXT NOT NULL,
                data_json TEXT NOT NULL,
                stored_at TEXT NOT NULL,
                expires_at_ms INTEGER NOT NULL
            )",
            [],
        )
        .map_err(storage)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_report_cache_expires
             ON report_cache(expires_at_ms)",
            [],
        )
        .map_err(storage)?;

        debug!("SQLite report cache schema initialized");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))
    }
}

fn storage(e: rusqlite::Error) -> CacheError {
    CacheError::Storage(e.to_string())
}

/// Expiry instant of an entry in epoch milliseconds, saturating for TTLs
/// past the representable range.
fn expires_at_ms(entry: &StoredReport) -> i64 {
    let ttl_ms = i64::try_from(entry.ttl.as_millis()).unwrap_or(i64::MAX);
    entry.stored_at.timestamp_millis().saturating_add(ttl_ms)
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    #[instrument(skip(self, key), fields(key = %key))]
    async fn load(&self, key: &CacheKey) -> Result<Option<StoredReport>, CacheError> {
        let conn = self.lock()?;
        let json = conn
            .query_row(
                "SELECT data_json FROM report_cache WHERE cache_key = ?1",
                params![key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(storage)?;

        match json {
            Some(json) => {
                let entry: StoredReport = serde_json::from_str(&json)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                debug!("Found stored report");
                Ok(Some(entry))
            }
            None => {
                debug!("No stored report");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, key, entry), fields(key = %key, ticker = %entry.report.ticker))]
    async fn store(&self, key: &CacheKey, entry: StoredReport) -> Result<(), CacheError> {
        let data_json =
            serde_json::to_string(&entry).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO report_cache
             (cache_key, ticker, data_json, stored_at, expires_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.as_str(),
                entry.report.ticker.as_str(),
                data_json,
                entry.stored_at.to_rfc3339(),
                expires_at_ms(&entry)
            ],
        )
        .map_err(storage)?;

        debug!("Stored report");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM report_cache WHERE cache_key = ?1",
            params![key.as_str()],
        )
        .map_err(storage)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM report_cache WHERE expires_at_ms <= ?1",
                params![now.timestamp_millis()],
            )
            .map_err(storage)?;

        if deleted > 0 {
            debug!("Purged {} expired reports", deleted);
        }
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), CacheError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM report_cache", []).map_err(storage)?;
        debug!("Cleared all stored reports");
        Ok(())
    }
}
