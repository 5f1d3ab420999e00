#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/valuation/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR filing fetcher.
//!
//! This crate provides:
//!
//! - [`RateLimitedClient`] - HTTP client with a shared token bucket and retry policy
//! - [`parse`] - Company-facts payload to [`FinancialSeries`](valuation_core::FinancialSeries)
//! - [`TickerDirectory`] - Ticker to CIK lookup
//! - [`EdgarOrchestrator`] - Resolve, fetch and parse as one state machine
//!
//! # Example
//!
//! ```no_run
//! use valuation_core::{FetchOrchestrator, Symbol};
//! use valuation_edgar::{EdgarConfig, EdgarOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EdgarConfig::new("Acme Research ops@acme.example")?;
//!     let orchestrator = EdgarOrchestrator::new(config)?;
//!
//!     let filings = orchestrator.fetch(&Symbol::new("AAPL")).await?;
//!     println!("{} values for {}", filings.series.len(), filings.entity);
//!     Ok(())
//! }
//! ```

/// Rate-limited HTTP client.
pub mod client;
/// Client configuration.
pub mod config;
/// Request rate limiting.
pub mod limiter;
/// State-machine fetch orchestration.
pub mod orchestrator;
/// Company-facts parsing.
pub mod parser;
/// Ticker resolution.
pub mod resolver;

pub use client::{RateLimitedClient, RawPayload, Request};
pub use config::{
    DEFAULT_RATE_LIMIT, DEFAULT_TIMEOUT, EdgarConfig, EdgarConfigBuilder, RetryPolicy,
    SEC_DATA_BASE_URL, SEC_TICKERS_URL,
};
pub use limiter::{RateLimiter, TokenBucket, Unlimited};
pub use orchestrator::{EdgarOrchestrator, FetchState};
pub use parser::{DataQualityNote, NoteKind, ParsedFilings, parse, parse_with_notes, xbrl_tags};
pub use resolver::{EntityResolver, StaticDirectory, TickerDirectory};
