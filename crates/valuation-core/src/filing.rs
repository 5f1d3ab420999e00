//! Filing metadata definitions.
//!
//! This module defines [`FilingType`] for the reporting hierarchy of a value,
//! [`UnitFamily`]/[`Unit`] for what a value measures, and [`Source`] for its
//! provenance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of filing a value was reported in.
///
/// Ordering follows the filing hierarchy: an annual report supersedes a
/// quarterly report for the same period end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilingType {
    /// Quarterly report (10-Q).
    Quarterly,
    /// Annual report (10-K and its variants).
    #[default]
    Annual,
}

impl FilingType {
    /// Classifies a regulator form code.
    ///
    /// Amendments and transition reports count as their base form. Forms that
    /// carry no periodic financial statements (8-K, S-1, ...) return `None`.
    #[must_use]
    pub fn from_form(form: &str) -> Option<Self> {
        let base = form.trim().split('/').next().unwrap_or_default();
        match base {
            "10-K" | "10-KT" | "10-K405" | "20-F" | "40-F" => Some(Self::Annual),
            "10-Q" | "10-QT" => Some(Self::Quarterly),
            _ => None,
        }
    }

    /// Returns true if this filing type supersedes `other` for the same period.
    #[must_use]
    pub fn supersedes(self, other: Self) -> bool {
        self > other
    }

    /// Accepted reporting-period length in days for duration facts.
    #[must_use]
    pub const fn duration_days(self) -> (i64, i64) {
        match self {
            Self::Annual => (350, 380),
            Self::Quarterly => (80, 100),
        }
    }

    /// Short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad family of units a concept is measured in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitFamily {
    /// Monetary amounts.
    Currency,
    /// Share counts.
    Shares,
}

/// Unit of a reported value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "lowercase")]
pub enum Unit {
    /// A currency, identified by its ISO 4217 code.
    Currency(String),
    /// A count of shares.
    Shares,
}

impl Unit {
    /// US dollars.
    #[must_use]
    pub fn usd() -> Self {
        Self::Currency("USD".to_string())
    }

    /// Parses a regulator unit label (`USD`, `EUR`, `shares`).
    ///
    /// Compound units such as `USD/shares` or `pure` have no family and
    /// return `None`.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        if label == "shares" {
            return Some(Self::Shares);
        }
        let is_iso_code = label.len() == 3 && label.chars().all(|c| c.is_ascii_uppercase());
        is_iso_code.then(|| Self::Currency(label.to_string()))
    }

    /// Returns the family of this unit.
    #[must_use]
    pub const fn family(&self) -> UnitFamily {
        match self {
            Self::Currency(_) => UnitFamily::Currency,
            Self::Shares => UnitFamily::Shares,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Currency(code) => f.write_str(code),
            Self::Shares => f.write_str("shares"),
        }
    }
}

/// Provenance of a value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Regulator filings (authoritative).
    #[default]
    Primary,
    /// Secondary market-data provider (gap filler).
    Secondary,
}

impl Source {
    /// Short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_form() {
        assert_eq!(FilingType::from_form("10-K"), Some(FilingType::Annual));
        assert_eq!(FilingType::from_form("10-K/A"), Some(FilingType::Annual));
        assert_eq!(FilingType::from_form("10-Q"), Some(FilingType::Quarterly));
        assert_eq!(FilingType::from_form("8-K"), None);
    }

    #[test]
    fn test_annual_supersedes_quarterly() {
        assert!(FilingType::Annual.supersedes(FilingType::Quarterly));
        assert!(!FilingType::Quarterly.supersedes(FilingType::Annual));
        assert!(!FilingType::Annual.supersedes(FilingType::Annual));
    }

    #[test]
    fn test_unit_parse() {
        assert_eq!(Unit::parse("USD"), Some(Unit::usd()));
        assert_eq!(Unit::parse("shares"), Some(Unit::Shares));
        assert_eq!(Unit::parse("USD/shares"), None);
        assert_eq!(Unit::parse("pure"), None);
        assert_eq!(Unit::parse("EUR").map(|u| u.family()), Some(UnitFamily::Currency));
    }
}
