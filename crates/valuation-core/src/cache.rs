//! Report cache key derivation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::report::DcfAssumptions;
use crate::types::Symbol;

/// Cache key for a computed report.
///
/// The hex SHA-256 digest of the ticker, the most recent fiscal period end in
/// the series, and the normalized DCF assumptions. A new filing moves the
/// period end and therefore the key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key.
    #[must_use]
    pub fn derive(
        ticker: &Symbol,
        latest_period_end: Option<NaiveDate>,
        assumptions: &DcfAssumptions,
    ) -> Self {
        let period = latest_period_end.map_or_else(|| "none".to_string(), |d| d.to_string());
        let material = format!(
            "{}|{}|{}",
            ticker.as_str(),
            period,
            assumptions.normalized_encoding()
        );
        Self(hex::encode(Sha256::digest(material.as_bytes())))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
