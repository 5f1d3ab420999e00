//! Per-share, margin and balance-sheet ratios.
//!
//! Statement inputs all come from one fiscal year, the latest with any
//! annual value. Every ratio is computed independently: a missing input or a
//! zero denominator makes that one ratio absent and leaves the others alone.
//! Price-based ratios are absent when no price is supplied.

use rust_decimal::{Decimal, MathematicalOps};
use std::collections::BTreeMap;
use valuation_core::{ConceptKey, FinancialSeries, RatioName};

use crate::inputs::{
    annual, free_cash_flow_in, gross_profit, net_debt, ratio, shares_outstanding, total_debt_in,
};

/// Graham's constant: a P/E of 15 times a P/B of 1.5.
const GRAHAM_MULTIPLIER: Decimal = Decimal::from_parts(225, 0, 0, false, 1);

/// Inputs shared by several ratios.
#[derive(Debug, Clone, Copy)]
struct RatioInputs<'a> {
    series: &'a FinancialSeries,
    year: Option<i32>,
    price: Option<Decimal>,
    shares: Option<Decimal>,
    net_income: Option<Decimal>,
    revenue: Option<Decimal>,
    operating_income: Option<Decimal>,
    equity: Option<Decimal>,
    free_cash_flow: Option<Decimal>,
}

impl<'a> RatioInputs<'a> {
    fn read(series: &'a FinancialSeries, price: Option<Decimal>) -> Self {
        let year = series.latest_fiscal_year();
        let get = |concept| year.and_then(|y| annual(series, concept, y));
        Self {
            series,
            year,
            price,
            shares: shares_outstanding(series),
            net_income: get(ConceptKey::NetIncome),
            revenue: get(ConceptKey::Revenue),
            operating_income: get(ConceptKey::OperatingIncome),
            equity: get(ConceptKey::StockholdersEquity),
            free_cash_flow: year.and_then(|y| free_cash_flow_in(series, y)),
        }
    }

    /// Annual value of a concept in the anchor year.
    fn annual(&self, concept: ConceptKey) -> Option<Decimal> {
        annual(self.series, concept, self.year?)
    }

    fn eps(&self) -> Option<Decimal> {
        ratio(self.net_income, self.shares)
    }

    fn book_value_per_share(&self) -> Option<Decimal> {
        ratio(self.equity, self.shares)
    }

    fn market_cap(&self) -> Option<Decimal> {
        self.price?.checked_mul(self.shares?)
    }
}

/// Computes every ratio in [`RatioName::all`] except
/// [`RatioName::ImpliedGrowth`], which needs DCF assumptions and is filled in
/// by the engine.
///
/// The returned map has an entry for every name, absent ones as `None`.
#[must_use]
pub fn ratios(series: &FinancialSeries, price: Option<Decimal>) -> BTreeMap<RatioName, Option<Decimal>> {
    let inputs = RatioInputs::read(series, price);
    RatioName::all()
        .iter()
        .map(|&name| (name, compute(name, &inputs)))
        .collect()
}

fn compute(name: RatioName, inputs: &RatioInputs<'_>) -> Option<Decimal> {
    match name {
        RatioName::PriceToEarnings => ratio(inputs.price, inputs.eps()),
        RatioName::PriceToBook => ratio(inputs.price, inputs.book_value_per_share()),
        RatioName::ReturnOnEquity => ratio(inputs.net_income, inputs.equity),
        RatioName::ReturnOnCapitalEmployed => {
            let assets = inputs.annual(ConceptKey::TotalAssets)?;
            let current = inputs.annual(ConceptKey::CurrentLiabilities)?;
            ratio(inputs.operating_income, assets.checked_sub(current))
        }
        RatioName::GrossMargin => ratio(gross_profit(inputs.series, inputs.year?), inputs.revenue),
        RatioName::OperatingMargin => ratio(inputs.operating_income, inputs.revenue),
        RatioName::NetMargin => ratio(inputs.net_income, inputs.revenue),
        RatioName::GrahamNumber => graham_number(inputs.eps()?, inputs.book_value_per_share()?),
        RatioName::EarningsYield => ratio(inputs.eps(), inputs.price),
        RatioName::PriceToFreeCashFlow => ratio(inputs.market_cap(), inputs.free_cash_flow),
        RatioName::FreeCashFlowYield => ratio(inputs.free_cash_flow, inputs.market_cap()),
        RatioName::EvToEbit => {
            let enterprise = inputs.market_cap()?.checked_add(net_debt(inputs.series)?);
            ratio(enterprise, inputs.operating_income)
        }
        RatioName::CurrentRatio => ratio(
            inputs.annual(ConceptKey::CurrentAssets),
            inputs.annual(ConceptKey::CurrentLiabilities),
        ),
        RatioName::DebtToEquity => ratio(total_debt_in(inputs.series, inputs.year?), inputs.equity),
        RatioName::RevenueGrowth => {
            let prior = annual(inputs.series, ConceptKey::Revenue, inputs.year? - 1);
            ratio(inputs.revenue, prior)?.checked_sub(Decimal::ONE)
        }
        RatioName::ImpliedGrowth => None,
    }
}

/// `sqrt(22.5 * EPS * BVPS)`, defined only when both are positive.
fn graham_number(eps: Decimal, book_value_per_share: Decimal) -> Option<Decimal> {
    if eps <= Decimal::ZERO || book_value_per_share <= Decimal::ZERO {
        return None;
    }
    GRAHAM_MULTIPLIER
        .checked_mul(eps)?
        .checked_mul(book_value_per_share)?
        .sqrt()
}
