#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/valuation/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Unified valuation pipeline.
//!
//! This crate re-exports the core types, the report cache and the provider
//! implementations, and provides the [`Analyzer`] that ties them together.
//!
//! # Features
//!
//! - `edgar` - SEC EDGAR fetcher
//! - `yahoo` - Yahoo Finance secondary provider
//! - `cache-sqlite` - SQLite-based report store
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use valuation::{Analyzer, DcfAssumptions, EdgarConfig, EdgarOrchestrator, Symbol, YahooProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = EdgarOrchestrator::new(EdgarConfig::from_env()?)?;
//!     let analyzer = Analyzer::new(Arc::new(orchestrator))
//!         .with_market_data(Arc::new(YahooProvider::new()?));
//!
//!     let analysis = analyzer
//!         .analyze(&Symbol::new("AAPL"), &DcfAssumptions::default())
//!         .await?;
//!     println!("{:?}", analysis.report.dcf_fair_value);
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use valuation_core::*;

// Report cache
#[cfg(feature = "cache-sqlite")]
pub use valuation_cache::SqliteReportStore;
pub use valuation_cache::{InMemoryReportStore, NoopReportStore, ReportCache};

// Metrics
pub use valuation_metrics::MetricsEngine;

// Providers
#[cfg(feature = "edgar")]
pub use valuation_edgar::{
    EdgarConfig, EdgarOrchestrator, RetryPolicy, StaticDirectory, TokenBucket, Unlimited,
};
#[cfg(feature = "yahoo")]
pub use valuation_yahoo::YahooProvider;

/// The fetch, reconcile, compute and cache pipeline.
pub mod analyzer;
/// Out-of-process fetch orchestration.
pub mod subprocess;

pub use analyzer::{Analysis, Analyzer, DEFAULT_CONCURRENCY, DEFAULT_REPORT_TTL};
pub use subprocess::{FailureReport, SubprocessOrchestrator};
