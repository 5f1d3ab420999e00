//! Series lookups shared by the metric calculators.

use chrono::Datelike;
use rust_decimal::Decimal;
use valuation_core::{ConceptKey, FinancialSeries};

/// `numerator / denominator`, absent on a missing input or zero denominator.
pub(crate) fn ratio(numerator: Option<Decimal>, denominator: Option<Decimal>) -> Option<Decimal> {
    let denominator = denominator.filter(|d| !d.is_zero())?;
    numerator?.checked_div(denominator)
}

/// Annual value of a concept for the fiscal year ending in `year`.
pub(crate) fn annual(series: &FinancialSeries, concept: ConceptKey, year: i32) -> Option<Decimal> {
    series.annual_in_year(concept, year).map(|v| v.value)
}

/// Most recent share count of any filing type, if positive.
pub(crate) fn shares_outstanding(series: &FinancialSeries) -> Option<Decimal> {
    series
        .latest(ConceptKey::SharesOutstanding)
        .map(|v| v.value)
        .filter(|s| s.is_sign_positive() && !s.is_zero())
}

/// Free cash flow of the latest fiscal year with an annual operating cash
/// flow. Absent when that year has no capital expenditures on file.
pub(crate) fn free_cash_flow(series: &FinancialSeries) -> Option<Decimal> {
    let year = series
        .latest_annual(ConceptKey::OperatingCashFlow)?
        .period_end
        .year();
    free_cash_flow_in(series, year)
}

/// Operating cash flow less capital expenditures, both for the fiscal year
/// ending in `year`.
///
/// Capex is filed as a positive payment by most issuers and as a negative
/// cash flow by some; its magnitude is subtracted either way.
pub(crate) fn free_cash_flow_in(series: &FinancialSeries, year: i32) -> Option<Decimal> {
    let ocf = annual(series, ConceptKey::OperatingCashFlow, year)?;
    let capex = annual(series, ConceptKey::CapitalExpenditures, year)?;
    ocf.checked_sub(capex.abs())
}

/// Gross profit for a fiscal year, derived from revenue and cost of revenue
/// when not filed directly.
pub(crate) fn gross_profit(series: &FinancialSeries, year: i32) -> Option<Decimal> {
    annual(series, ConceptKey::GrossProfit, year).or_else(|| {
        let revenue = annual(series, ConceptKey::Revenue, year)?;
        let cost = annual(series, ConceptKey::CostOfRevenue, year)?;
        revenue.checked_sub(cost)
    })
}

/// Long-term plus short-term debt; a missing component counts as zero, both
/// missing is absent.
pub(crate) fn total_debt(series: &FinancialSeries) -> Option<Decimal> {
    let long = series.latest(ConceptKey::LongTermDebt).map(|v| v.value);
    let short = series.latest(ConceptKey::ShortTermDebt).map(|v| v.value);
    sum_debt(long, short)
}

/// [`total_debt`] as of the fiscal year ending in `year`.
pub(crate) fn total_debt_in(series: &FinancialSeries, year: i32) -> Option<Decimal> {
    sum_debt(
        annual(series, ConceptKey::LongTermDebt, year),
        annual(series, ConceptKey::ShortTermDebt, year),
    )
}

fn sum_debt(long: Option<Decimal>, short: Option<Decimal>) -> Option<Decimal> {
    match (long, short) {
        (None, None) => None,
        (long, short) => long
            .unwrap_or_default()
            .checked_add(short.unwrap_or_default()),
    }
}

/// Total debt less cash and equivalents.
pub(crate) fn net_debt(series: &FinancialSeries) -> Option<Decimal> {
    let cash = series.latest(ConceptKey::CashAndEquivalents)?.value;
    total_debt(series)?.checked_sub(cash)
}
