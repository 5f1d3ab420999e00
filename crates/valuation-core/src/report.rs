//! Valuation inputs and outputs.
//!
//! - [`DcfAssumptions`] - Caller-supplied discounted-cash-flow parameters
//! - [`PiotroskiBreakdown`] - Per-criterion outcomes of the F-Score
//! - [`RatioName`] - Names of the reported ratios
//! - [`MetricsReport`] - Everything computed for one ticker

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValuationError;
use crate::types::Symbol;

/// Longest projection horizon accepted.
pub const MAX_HORIZON_YEARS: u32 = 50;

/// Whether net debt is subtracted from enterprise value before the
/// per-share division.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetDebtPolicy {
    /// Fair value = enterprise value / shares.
    #[default]
    Ignore,
    /// Fair value = (enterprise value - (debt - cash)) / shares.
    Subtract,
}

impl NetDebtPolicy {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Subtract => "subtract",
        }
    }
}

/// Discounted-cash-flow assumptions.
///
/// Rates are decimal fractions: 7.4% is `0.074`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcfAssumptions {
    /// Number of explicitly projected years.
    pub horizon_years: u32,
    /// Annual free-cash-flow growth over the horizon.
    pub growth_rate: Decimal,
    /// Required return used to discount every projected year.
    pub discount_rate: Decimal,
    /// Perpetual growth after the horizon; must be below `discount_rate`.
    pub terminal_growth_rate: Decimal,
    /// Net-debt handling.
    #[serde(default)]
    pub net_debt: NetDebtPolicy,
}

impl Default for DcfAssumptions {
    fn default() -> Self {
        Self {
            horizon_years: 5,
            growth_rate: Decimal::new(5, 2),
            discount_rate: Decimal::new(9, 2),
            terminal_growth_rate: Decimal::new(2, 2),
            net_debt: NetDebtPolicy::Ignore,
        }
    }
}

impl DcfAssumptions {
    /// Creates assumptions with the default net-debt policy.
    #[must_use]
    pub const fn new(
        horizon_years: u32,
        growth_rate: Decimal,
        discount_rate: Decimal,
        terminal_growth_rate: Decimal,
    ) -> Self {
        Self {
            horizon_years,
            growth_rate,
            discount_rate,
            terminal_growth_rate,
            net_debt: NetDebtPolicy::Ignore,
        }
    }

    /// Sets the net-debt policy.
    #[must_use]
    pub const fn with_net_debt(mut self, policy: NetDebtPolicy) -> Self {
        self.net_debt = policy;
        self
    }

    /// Checks the assumptions before any computation.
    ///
    /// # Errors
    /// Returns [`ValuationError::InvalidAssumptions`] if the terminal growth
    /// rate is not strictly below the discount rate, the discount rate is not
    /// positive, growth is at or below -100%, or the horizon is outside
    /// `1..=MAX_HORIZON_YEARS`.
    pub fn validate(&self) -> Result<(), ValuationError> {
        if self.terminal_growth_rate >= self.discount_rate {
            return Err(ValuationError::InvalidAssumptions(format!(
                "terminal growth rate {} must be below discount rate {}",
                self.terminal_growth_rate, self.discount_rate
            )));
        }
        if self.discount_rate <= Decimal::ZERO {
            return Err(ValuationError::InvalidAssumptions(format!(
                "discount rate {} must be positive",
                self.discount_rate
            )));
        }
        if self.growth_rate <= Decimal::NEGATIVE_ONE
            || self.terminal_growth_rate <= Decimal::NEGATIVE_ONE
        {
            return Err(ValuationError::InvalidAssumptions(
                "growth rates must be above -100%".to_string(),
            ));
        }
        if self.horizon_years == 0 || self.horizon_years > MAX_HORIZON_YEARS {
            return Err(ValuationError::InvalidAssumptions(format!(
                "horizon must be between 1 and {MAX_HORIZON_YEARS} years, got {}",
                self.horizon_years
            )));
        }
        Ok(())
    }

    /// Canonical text form used in cache keys.
    ///
    /// Numerically equal assumptions (`0.05` and `0.050`) encode identically.
    #[must_use]
    pub fn normalized_encoding(&self) -> String {
        format!(
            "h={};g={};r={};tg={};nd={}",
            self.horizon_years,
            self.growth_rate.normalize(),
            self.discount_rate.normalize(),
            self.terminal_growth_rate.normalize(),
            self.net_debt.as_str()
        )
    }
}

/// The nine F-Score criteria.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiotroskiCriterion {
    /// Net income above zero.
    PositiveNetIncome,
    /// Operating cash flow above zero.
    PositiveOperatingCashFlow,
    /// Return on assets higher than the prior year.
    ImprovingReturnOnAssets,
    /// Operating cash flow above net income.
    CashFlowExceedsNetIncome,
    /// Liabilities-to-assets lower than the prior year.
    DecreasingLeverage,
    /// Current ratio higher than the prior year.
    ImprovingCurrentRatio,
    /// Shares outstanding not above the prior year.
    NoNewShares,
    /// Gross margin higher than the prior year.
    ImprovingGrossMargin,
    /// Revenue-to-assets higher than the prior year.
    ImprovingAssetTurnover,
}

impl PiotroskiCriterion {
    /// All nine criteria in scoring order.
    #[must_use]
    pub const fn all() -> [Self; 9] {
        [
            Self::PositiveNetIncome,
            Self::PositiveOperatingCashFlow,
            Self::ImprovingReturnOnAssets,
            Self::CashFlowExceedsNetIncome,
            Self::DecreasingLeverage,
            Self::ImprovingCurrentRatio,
            Self::NoNewShares,
            Self::ImprovingGrossMargin,
            Self::ImprovingAssetTurnover,
        ]
    }
}

/// Result of one criterion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionOutcome {
    /// Inputs present and the condition holds.
    Passed,
    /// Inputs present and the condition does not hold.
    Failed,
    /// At least one current or prior-year input is missing.
    NotEvaluable,
}

/// One evaluated criterion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionResult {
    /// The criterion.
    pub criterion: PiotroskiCriterion,
    /// Its outcome.
    pub outcome: CriterionOutcome,
}

/// Per-criterion F-Score outcomes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiotroskiBreakdown {
    /// Fiscal year scored.
    pub current_year: Option<i32>,
    /// Fiscal year compared against.
    pub prior_year: Option<i32>,
    /// One entry per criterion, in scoring order.
    pub criteria: Vec<CriterionResult>,
}

impl PiotroskiBreakdown {
    /// A breakdown where nothing could be evaluated.
    #[must_use]
    pub fn not_evaluable() -> Self {
        Self {
            current_year: None,
            prior_year: None,
            criteria: PiotroskiCriterion::all()
                .into_iter()
                .map(|criterion| CriterionResult {
                    criterion,
                    outcome: CriterionOutcome::NotEvaluable,
                })
                .collect(),
        }
    }

    /// Returns the outcome of a criterion.
    #[must_use]
    pub fn outcome(&self, criterion: PiotroskiCriterion) -> CriterionOutcome {
        self.criteria
            .iter()
            .find(|r| r.criterion == criterion)
            .map_or(CriterionOutcome::NotEvaluable, |r| r.outcome)
    }

    /// Criteria flagged as not evaluable.
    pub fn not_evaluable_criteria(&self) -> impl Iterator<Item = PiotroskiCriterion> + '_ {
        self.criteria
            .iter()
            .filter(|r| r.outcome == CriterionOutcome::NotEvaluable)
            .map(|r| r.criterion)
    }

    /// Number of criteria whose inputs were all present.
    #[must_use]
    pub fn evaluable_count(&self) -> usize {
        self.criteria
            .iter()
            .filter(|r| r.outcome != CriterionOutcome::NotEvaluable)
            .count()
    }

    /// The score: passed criteria, 0 to 9.
    ///
    /// `None` when no criterion was evaluable, which is distinct from a
    /// computed zero.
    #[must_use]
    pub fn score(&self) -> Option<u8> {
        if self.evaluable_count() == 0 {
            return None;
        }
        let passed = self
            .criteria
            .iter()
            .filter(|r| r.outcome == CriterionOutcome::Passed)
            .count();
        u8::try_from(passed).ok()
    }
}

/// Reported ratio names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioName {
    /// Price / earnings per share.
    PriceToEarnings,
    /// Price / book value per share.
    PriceToBook,
    /// Net income / equity.
    ReturnOnEquity,
    /// Operating income / (total assets - current liabilities).
    ReturnOnCapitalEmployed,
    /// Gross profit / revenue.
    GrossMargin,
    /// Operating income / revenue.
    OperatingMargin,
    /// Net income / revenue.
    NetMargin,
    /// sqrt(22.5 * EPS * BVPS).
    GrahamNumber,
    /// Earnings per share / price.
    EarningsYield,
    /// Market cap / free cash flow.
    PriceToFreeCashFlow,
    /// Free cash flow / market cap.
    FreeCashFlowYield,
    /// (Market cap + debt - cash) / operating income.
    EvToEbit,
    /// Current assets / current liabilities.
    CurrentRatio,
    /// Total debt / equity.
    DebtToEquity,
    /// Year-over-year annual revenue growth.
    RevenueGrowth,
    /// Growth rate at which the DCF equals the market price.
    ImpliedGrowth,
}

impl RatioName {
    /// Every ratio, in report order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::PriceToEarnings,
            Self::PriceToBook,
            Self::ReturnOnEquity,
            Self::ReturnOnCapitalEmployed,
            Self::GrossMargin,
            Self::OperatingMargin,
            Self::NetMargin,
            Self::GrahamNumber,
            Self::EarningsYield,
            Self::PriceToFreeCashFlow,
            Self::FreeCashFlowYield,
            Self::EvToEbit,
            Self::CurrentRatio,
            Self::DebtToEquity,
            Self::RevenueGrowth,
            Self::ImpliedGrowth,
        ]
    }

    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PriceToEarnings => "price_to_earnings",
            Self::PriceToBook => "price_to_book",
            Self::ReturnOnEquity => "return_on_equity",
            Self::ReturnOnCapitalEmployed => "return_on_capital_employed",
            Self::GrossMargin => "gross_margin",
            Self::OperatingMargin => "operating_margin",
            Self::NetMargin => "net_margin",
            Self::GrahamNumber => "graham_number",
            Self::EarningsYield => "earnings_yield",
            Self::PriceToFreeCashFlow => "price_to_free_cash_flow",
            Self::FreeCashFlowYield => "free_cash_flow_yield",
            Self::EvToEbit => "ev_to_ebit",
            Self::CurrentRatio => "current_ratio",
            Self::DebtToEquity => "debt_to_equity",
            Self::RevenueGrowth => "revenue_growth",
            Self::ImpliedGrowth => "implied_growth",
        }
    }
}

impl fmt::Display for RatioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Valuation and quality metrics for one ticker.
///
/// Every numeric field is either a finite decimal or `None`; `None` means
/// insufficient input data for that metric alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Ticker the report is for.
    pub ticker: Symbol,
    /// When the report was computed.
    pub computed_at: DateTime<Utc>,
    /// Most recent period end present in the input series.
    pub fiscal_period_end: Option<NaiveDate>,
    /// Assumptions the DCF used.
    pub assumptions: DcfAssumptions,
    /// Market price the price-based ratios were computed at.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// DCF fair value per share.
    pub dcf_fair_value: Option<Decimal>,
    /// F-Score, 0 to 9.
    pub piotroski_score: Option<u8>,
    /// Per-criterion F-Score outcomes.
    pub piotroski: PiotroskiBreakdown,
    /// Every ratio in [`RatioName::all`], present or absent.
    pub ratios: BTreeMap<RatioName, Option<Decimal>>,
}

impl MetricsReport {
    /// Returns a ratio value, `None` if absent.
    #[must_use]
    pub fn ratio(&self, name: RatioName) -> Option<Decimal> {
        self.ratios.get(&name).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_assumptions() {
        let a = DcfAssumptions::default();
        assert_eq!(a.horizon_years, 5);
        assert_eq!(a.growth_rate, dec!(0.05));
        assert_eq!(a.discount_rate, dec!(0.09));
        assert_eq!(a.terminal_growth_rate, dec!(0.02));
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_terminal_growth_at_or_above_discount_rejected() {
        let equal = DcfAssumptions::new(5, dec!(0.05), dec!(0.09), dec!(0.09));
        let above = DcfAssumptions::new(5, dec!(0.05), dec!(0.09), dec!(0.10));
        assert!(matches!(equal.validate(), Err(ValuationError::InvalidAssumptions(_))));
        assert!(matches!(above.validate(), Err(ValuationError::InvalidAssumptions(_))));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let a = DcfAssumptions::new(0, dec!(0.05), dec!(0.09), dec!(0.02));
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_normalized_encoding_ignores_trailing_zeros() {
        let a = DcfAssumptions::new(5, dec!(0.05), dec!(0.09), dec!(0.02));
        let b = DcfAssumptions::new(5, dec!(0.050), dec!(0.0900), dec!(0.02));
        assert_eq!(a.normalized_encoding(), b.normalized_encoding());
        assert_eq!(a.normalized_encoding(), "h=5;g=0.05;r=0.09;tg=0.02;nd=ignore");

        let c = a.clone().with_net_debt(NetDebtPolicy::Subtract);
        assert_ne!(a.normalized_encoding(), c.normalized_encoding());
    }

    #[test]
    fn test_score_distinguishes_absent_from_zero() {
        assert_eq!(PiotroskiBreakdown::not_evaluable().score(), None);

        let mut breakdown = PiotroskiBreakdown::not_evaluable();
        breakdown.criteria[0].outcome = CriterionOutcome::Failed;
        assert_eq!(breakdown.score(), Some(0));
        assert_eq!(breakdown.evaluable_count(), 1);
        assert_eq!(breakdown.not_evaluable_criteria().count(), 8);
    }

    #[test]
    fn test_ratio_names_unique() {
        let mut names: Vec<_> = RatioName::all().iter().map(|r| r.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RatioName::all().len());
    }
}
