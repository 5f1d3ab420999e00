#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/valuation/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core types, traits and errors for filing-driven valuation.
//!
//! - [`FinancialSeries`](types::FinancialSeries) - Deduplicated concept time series
//! - [`FetchOrchestrator`](provider::FetchOrchestrator) - Ticker to series, or a typed failure
//! - [`MarketDataProvider`](provider::MarketDataProvider) - Secondary fundamentals
//! - [`ReportStore`](provider::ReportStore) - Report persistence
//! - [`reconcile`](reconcile::reconcile) - Gap-filling merge
//! - [`CacheKey`](cache::CacheKey) - Report cache key

/// Report cache key derivation.
pub mod cache;
/// Error types for every layer.
pub mod error;
/// Filing type, unit and provenance definitions.
pub mod filing;
/// Collaborator traits.
pub mod provider;
/// Primary/secondary merge.
pub mod reconcile;
/// Valuation assumptions and reports.
pub mod report;
/// Core data types (Symbol, ConceptKey, FinancialSeries, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::CacheKey;
pub use error::{
    AnalysisError, CacheError, ConfigError, FetchError, FetchFailure, MarketDataError, ParseError,
    ResolveError, Result, ValuationError,
};
pub use filing::{FilingType, Source, Unit, UnitFamily};
pub use provider::{FetchOrchestrator, MarketDataProvider, MarketSnapshot, ReportStore, StoredReport};
pub use reconcile::reconcile;
pub use report::{
    CriterionOutcome, CriterionResult, DcfAssumptions, MetricsReport, NetDebtPolicy,
    PiotroskiBreakdown, PiotroskiCriterion, RatioName,
};
pub use types::{CompanyFilings, ConceptKey, DatedValue, EntityIdentifier, FinancialSeries, Symbol};
