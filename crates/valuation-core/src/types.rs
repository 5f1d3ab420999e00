//! Core data types for normalized filings data.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`EntityIdentifier`] - Ticker paired with the regulator's internal id
//! - [`ConceptKey`] - The closed set of accounting concepts
//! - [`DatedValue`] - One reported value for a fiscal period
//! - [`FinancialSeries`] - Concept to ordered, deduplicated values
//! - [`CompanyFilings`] - A fetched series with its entity metadata

use chrono::{Datelike, NaiveDate};
use polars::prelude::{Column, DataFrame, PolarsResult};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::filing::{FilingType, Source, Unit, UnitFamily};

/// A trading symbol/ticker.
///
/// Symbols are automatically uppercased and trimmed on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the symbol is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A ticker resolved to the regulator's internal entity identifier (CIK).
///
/// Immutable once resolved.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityIdentifier {
    ticker: Symbol,
    cik: String,
}

impl EntityIdentifier {
    /// Creates an identifier from a numeric CIK.
    #[must_use]
    pub fn new(ticker: Symbol, cik: u64) -> Self {
        Self {
            ticker,
            cik: format!("{cik:0>10}"),
        }
    }

    /// Returns the ticker.
    #[must_use]
    pub const fn ticker(&self) -> &Symbol {
        &self.ticker
    }

    /// Returns the CIK, zero-padded to 10 digits.
    #[must_use]
    pub fn cik(&self) -> &str {
        &self.cik
    }
}

impl fmt::Display for EntityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (CIK {})", self.ticker, self.cik)
    }
}

/// Accounting concepts understood by the system.
///
/// Anything outside this set is ignored while parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConceptKey {
    /// Total revenue.
    Revenue,
    /// Cost of revenue (COGS).
    CostOfRevenue,
    /// Gross profit.
    GrossProfit,
    /// Operating income (EBIT).
    OperatingIncome,
    /// Net income.
    NetIncome,
    /// Net cash from operating activities.
    OperatingCashFlow,
    /// Payments for property, plant and equipment.
    CapitalExpenditures,
    /// Share-based compensation expense.
    ShareBasedCompensation,
    /// Total assets.
    TotalAssets,
    /// Current assets.
    CurrentAssets,
    /// Cash and cash equivalents.
    CashAndEquivalents,
    /// Total liabilities.
    TotalLiabilities,
    /// Current liabilities.
    CurrentLiabilities,
    /// Long-term debt.
    LongTermDebt,
    /// Short-term borrowings and current portion of long-term debt.
    ShortTermDebt,
    /// Stockholders' equity.
    StockholdersEquity,
    /// Common shares outstanding.
    SharesOutstanding,
}

impl ConceptKey {
    /// Every concept, in declaration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Revenue,
            Self::CostOfRevenue,
            Self::GrossProfit,
            Self::OperatingIncome,
            Self::NetIncome,
            Self::OperatingCashFlow,
            Self::CapitalExpenditures,
            Self::ShareBasedCompensation,
            Self::TotalAssets,
            Self::CurrentAssets,
            Self::CashAndEquivalents,
            Self::TotalLiabilities,
            Self::CurrentLiabilities,
            Self::LongTermDebt,
            Self::ShortTermDebt,
            Self::StockholdersEquity,
            Self::SharesOutstanding,
        ]
    }

    /// Unit family a value of this concept must be reported in.
    #[must_use]
    pub const fn unit_family(self) -> UnitFamily {
        match self {
            Self::SharesOutstanding => UnitFamily::Shares,
            _ => UnitFamily::Currency,
        }
    }

    /// Returns true for duration (income statement and cash flow) concepts,
    /// false for point-in-time balances.
    #[must_use]
    pub const fn is_flow(self) -> bool {
        matches!(
            self,
            Self::Revenue
                | Self::CostOfRevenue
                | Self::GrossProfit
                | Self::OperatingIncome
                | Self::NetIncome
                | Self::OperatingCashFlow
                | Self::CapitalExpenditures
                | Self::ShareBasedCompensation
        )
    }

    /// Returns the concept name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Revenue => "Revenue",
            Self::CostOfRevenue => "CostOfRevenue",
            Self::GrossProfit => "GrossProfit",
            Self::OperatingIncome => "OperatingIncome",
            Self::NetIncome => "NetIncome",
            Self::OperatingCashFlow => "OperatingCashFlow",
            Self::CapitalExpenditures => "CapitalExpenditures",
            Self::ShareBasedCompensation => "ShareBasedCompensation",
            Self::TotalAssets => "TotalAssets",
            Self::CurrentAssets => "CurrentAssets",
            Self::CashAndEquivalents => "CashAndEquivalents",
            Self::TotalLiabilities => "TotalLiabilities",
            Self::CurrentLiabilities => "CurrentLiabilities",
            Self::LongTermDebt => "LongTermDebt",
            Self::ShortTermDebt => "ShortTermDebt",
            Self::StockholdersEquity => "StockholdersEquity",
            Self::SharesOutstanding => "SharesOutstanding",
        }
    }
}

impl fmt::Display for ConceptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported value for a fiscal period.
///
/// The raw sign of `value` is preserved as filed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedValue {
    /// End date of the fiscal period.
    pub period_end: NaiveDate,
    /// Reported value.
    pub value: Decimal,
    /// Unit of the value.
    pub unit: Unit,
    /// Filing type the value was reported in.
    pub filing_type: FilingType,
    /// Provenance of the value.
    #[serde(default)]
    pub source: Source,
    /// Date the containing filing was submitted, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filed: Option<NaiveDate>,
}

impl DatedValue {
    /// Creates a primary-source value with no filing date.
    #[must_use]
    pub const fn new(period_end: NaiveDate, value: Decimal, unit: Unit, filing_type: FilingType) -> Self {
        Self {
            period_end,
            value,
            unit,
            filing_type,
            source: Source::Primary,
            filed: None,
        }
    }

    /// Sets the filing date.
    #[must_use]
    pub const fn with_filed(mut self, filed: NaiveDate) -> Self {
        self.filed = Some(filed);
        self
    }

    /// Sets the provenance tag.
    #[must_use]
    pub const fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Returns true if `self` should replace `existing` for the same period end.
    ///
    /// Annual beats quarterly regardless of filing date. Within one filing
    /// type the later filing (a restatement) wins; ties keep `existing`.
    #[must_use]
    pub fn supersedes(&self, existing: &Self) -> bool {
        if self.filing_type != existing.filing_type {
            return self.filing_type.supersedes(existing.filing_type);
        }
        match (self.filed, existing.filed) {
            (Some(new), Some(old)) => new > old,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Mapping from concept to its values, ordered by period end ascending.
///
/// A series never holds two values for the same (concept, period end):
/// [`FinancialSeries::insert`] applies the supersession rule of
/// [`DatedValue::supersedes`]. Deserialization goes through the same path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<ConceptKey, Vec<DatedValue>>",
    into = "BTreeMap<ConceptKey, Vec<DatedValue>>"
)]
pub struct FinancialSeries {
    values: BTreeMap<ConceptKey, Vec<DatedValue>>,
}

impl FinancialSeries {
    /// Creates an empty series.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, keeping the series ordered and deduplicated.
    ///
    /// Returns true if the value was retained.
    pub fn insert(&mut self, concept: ConceptKey, value: DatedValue) -> bool {
        let values = self.values.entry(concept).or_default();
        match values.binary_search_by_key(&value.period_end, |v| v.period_end) {
            Ok(idx) => {
                if value.supersedes(&values[idx]) {
                    values[idx] = value;
                    true
                } else {
                    false
                }
            }
            Err(idx) => {
                values.insert(idx, value);
                true
            }
        }
    }

    /// Returns true if a value exists for the concept at this period end.
    #[must_use]
    pub fn contains(&self, concept: ConceptKey, period_end: NaiveDate) -> bool {
        self.get(concept)
            .binary_search_by_key(&period_end, |v| v.period_end)
            .is_ok()
    }

    /// Returns all values of a concept, oldest first.
    #[must_use]
    pub fn get(&self, concept: ConceptKey) -> &[DatedValue] {
        self.values.get(&concept).map_or(&[], Vec::as_slice)
    }

    /// Returns the most recent value of a concept, of any filing type.
    #[must_use]
    pub fn latest(&self, concept: ConceptKey) -> Option<&DatedValue> {
        self.get(concept).last()
    }

    /// Returns the most recent annual value of a concept.
    #[must_use]
    pub fn latest_annual(&self, concept: ConceptKey) -> Option<&DatedValue> {
        self.get(concept)
            .iter()
            .rev()
            .find(|v| v.filing_type == FilingType::Annual)
    }

    /// Returns the annual value of a concept whose period ends in `year`.
    #[must_use]
    pub fn annual_in_year(&self, concept: ConceptKey, year: i32) -> Option<&DatedValue> {
        self.get(concept)
            .iter()
            .rev()
            .find(|v| v.filing_type == FilingType::Annual && v.period_end.year() == year)
    }

    /// Returns the most recent period end present in the series.
    #[must_use]
    pub fn latest_period_end(&self) -> Option<NaiveDate> {
        self.values
            .values()
            .filter_map(|v| v.last().map(|d| d.period_end))
            .max()
    }

    /// Returns the calendar year of the most recent annual period end.
    #[must_use]
    pub fn latest_fiscal_year(&self) -> Option<i32> {
        self.values
            .values()
            .flatten()
            .filter(|v| v.filing_type == FilingType::Annual)
            .map(|v| v.period_end.year())
            .max()
    }

    /// Returns the concepts that have at least one value.
    pub fn concepts(&self) -> impl Iterator<Item = ConceptKey> + '_ {
        self.values.keys().copied()
    }

    /// Iterates over every (concept, value) pair, concept by concept.
    pub fn iter(&self) -> impl Iterator<Item = (ConceptKey, &DatedValue)> {
        self.values
            .iter()
            .flat_map(|(concept, values)| values.iter().map(move |v| (*concept, v)))
    }

    /// Returns the total number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    /// Returns true if the series holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Exports the series as a long-format DataFrame.
    ///
    /// Columns: concept, period_end, value, unit, filing_type, source. Values
    /// are converted to `f64` here; valuation math never goes through this.
    ///
    /// # Errors
    /// Returns an error if polars rejects the column construction.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let len = self.len();
        let mut concepts = Vec::with_capacity(len);
        let mut period_ends = Vec::with_capacity(len);
        let mut values: Vec<Option<f64>> = Vec::with_capacity(len);
        let mut units = Vec::with_capacity(len);
        let mut filing_types = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);

        for (concept, value) in self.iter() {
            concepts.push(concept.as_str());
            period_ends.push(value.period_end);
            values.push(value.value.to_f64());
            units.push(value.unit.to_string());
            filing_types.push(value.filing_type.as_str());
            sources.push(value.source.as_str());
        }

        DataFrame::new(vec![
            Column::new("concept".into(), concepts),
            Column::new("period_end".into(), period_ends),
            Column::new("value".into(), values),
            Column::new("unit".into(), units),
            Column::new("filing_type".into(), filing_types),
            Column::new("source".into(), sources),
        ])
    }
}

impl From<BTreeMap<ConceptKey, Vec<DatedValue>>> for FinancialSeries {
    fn from(map: BTreeMap<ConceptKey, Vec<DatedValue>>) -> Self {
        let mut series = Self::new();
        for (concept, values) in map {
            for value in values {
                series.insert(concept, value);
            }
        }
        series
    }
}

impl From<FinancialSeries> for BTreeMap<ConceptKey, Vec<DatedValue>> {
    fn from(series: FinancialSeries) -> Self {
        series.values
    }
}

/// A fetched series together with the entity it belongs to.
///
/// This is also the structured payload emitted by the out-of-process fetcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyFilings {
    /// The resolved entity.
    pub entity: EntityIdentifier,
    /// Registered entity name, when the upstream supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    /// Normalized series.
    pub series: FinancialSeries,
}

impl CompanyFilings {
    /// Creates a new filings bundle.
    #[must_use]
    pub const fn new(entity: EntityIdentifier, series: FinancialSeries) -> Self {
        Self {
            entity,
            entity_name: None,
            series,
        }
    }

    /// Sets the entity name.
    #[must_use]
    pub fn with_entity_name(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self
    }
}
