//! Assembles a [`MetricsReport`] from a series.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, instrument};
use valuation_core::{DcfAssumptions, FinancialSeries, MetricsReport, RatioName, Symbol, ValuationError};

use crate::dcf::{dcf_fair_value, implied_growth};
use crate::piotroski::piotroski;
use crate::ratios::ratios;

/// Computes every metric for a series.
///
/// Stateless; one engine can serve any number of concurrent analyses.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsEngine;

impl MetricsEngine {
    /// Creates an engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a report without a market price; price-based ratios are
    /// absent.
    ///
    /// # Errors
    /// [`ValuationError::InvalidAssumptions`] before anything is computed,
    /// whatever the series holds.
    pub fn compute(
        &self,
        ticker: &Symbol,
        series: &FinancialSeries,
        assumptions: &DcfAssumptions,
    ) -> Result<MetricsReport, ValuationError> {
        self.compute_at_price(ticker, series, assumptions, None)
    }

    /// Computes a report using `price` for the market-based ratios and the
    /// implied growth rate. A non-positive price is treated as absent.
    ///
    /// # Errors
    /// See [`compute`](Self::compute).
    #[instrument(skip(self, ticker, series, assumptions, price), fields(ticker = %ticker))]
    pub fn compute_at_price(
        &self,
        ticker: &Symbol,
        series: &FinancialSeries,
        assumptions: &DcfAssumptions,
        price: Option<Decimal>,
    ) -> Result<MetricsReport, ValuationError> {
        assumptions.validate()?;
        let price = price.filter(|p| *p > Decimal::ZERO);

        let dcf_fair_value = dcf_fair_value(series, assumptions)?;
        let piotroski = piotroski(series);
        let mut ratios = ratios(series, price);
        let implied = match price {
            Some(price) => implied_growth(series, assumptions, price)?,
            None => None,
        };
        ratios.insert(RatioName::ImpliedGrowth, implied);

        let report = MetricsReport {
            ticker: ticker.clone(),
            computed_at: Utc::now(),
            fiscal_period_end: series.latest_period_end(),
            assumptions: assumptions.clone(),
            price,
            dcf_fair_value,
            piotroski_score: piotroski.score(),
            piotroski,
            ratios,
        };
        debug!(
            dcf = ?report.dcf_fair_value,
            piotroski = ?report.piotroski_score,
            ratios = report.ratios.values().filter(|v| v.is_some()).count(),
            "metrics computed"
        );
        Ok(report)
    }
}
