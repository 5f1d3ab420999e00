#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/valuation/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Pure valuation functions over a [`FinancialSeries`](valuation_core::FinancialSeries).
//!
//! - [`MetricsEngine`](engine::MetricsEngine) - Full report
//! - [`dcf_fair_value`](dcf::dcf_fair_value) - Discounted cash flow per share
//! - [`piotroski`](piotroski::piotroski) - F-Score breakdown
//! - [`ratios`](ratios::ratios) - Per-share and margin ratios

/// Discounted cash flow and implied growth.
pub mod dcf;
/// Report assembly.
pub mod engine;
/// Piotroski F-Score.
pub mod piotroski;
/// Financial ratios.
pub mod ratios;

mod inputs;

pub use dcf::{dcf_fair_value, enterprise_value, implied_growth};
pub use engine::MetricsEngine;
pub use piotroski::piotroski;
pub use ratios::ratios;
