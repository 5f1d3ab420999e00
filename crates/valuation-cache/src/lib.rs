#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/valuation/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Report caching.
//!
//! [`ReportCache`] is the gateway; the stores implement the
//! [`ReportStore`] trait from `valuation-core`:
//!
//! - [`SqliteReportStore`] - Persistent SQLite-based store (default, requires `sqlite` feature)
//! - [`InMemoryReportStore`] - Simple in-memory store for testing
//! - [`NoopReportStore`] - Store that keeps nothing

/// Cache gateway.
pub mod gateway;
/// In-memory store.
pub mod memory;
/// No-op store.
pub mod noop;

/// SQLite-based store.
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use valuation_core::ReportStore;

pub use gateway::ReportCache;
pub use memory::InMemoryReportStore;
pub use noop::NoopReportStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteReportStore;
