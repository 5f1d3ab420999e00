//! Discounted cash flow.
//!
//! The latest annual free cash flow is grown at `growth_rate` for
//! `horizon_years`, each projected year is discounted at `discount_rate`, and
//! a Gordon-growth terminal value on the final projected year is discounted
//! from the end of the horizon. All arithmetic is checked: an overflow makes
//! the value absent rather than wrapping or panicking.

use rust_decimal::Decimal;
use tracing::trace;
use valuation_core::{DcfAssumptions, FinancialSeries, NetDebtPolicy, ValuationError};

use crate::inputs::{free_cash_flow, net_debt, shares_outstanding};

/// Lower bound of the implied-growth search.
pub const IMPLIED_GROWTH_FLOOR: Decimal = Decimal::from_parts(5, 0, 0, true, 1);
/// Upper bound of the implied-growth search.
pub const IMPLIED_GROWTH_CEILING: Decimal = Decimal::ONE;
/// Maximum bisection steps.
pub const IMPLIED_GROWTH_MAX_ITERATIONS: usize = 100;
/// Price tolerance at which the bisection stops.
pub const IMPLIED_GROWTH_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Inputs of a valuation, read once from the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DcfInputs {
    free_cash_flow: Decimal,
    shares: Decimal,
    net_debt: Decimal,
}

impl DcfInputs {
    fn from_series(series: &FinancialSeries, policy: NetDebtPolicy) -> Option<Self> {
        let free_cash_flow = free_cash_flow(series)?;
        let shares = shares_outstanding(series)?;
        let net_debt = match policy {
            NetDebtPolicy::Ignore => Decimal::ZERO,
            NetDebtPolicy::Subtract => net_debt(series)?,
        };
        Some(Self {
            free_cash_flow,
            shares,
            net_debt,
        })
    }

    fn per_share(&self, assumptions: &DcfAssumptions, growth_rate: Decimal) -> Option<Decimal> {
        let enterprise = enterprise_value(self.free_cash_flow, assumptions, growth_rate)?;
        enterprise.checked_sub(self.net_debt)?.checked_div(self.shares)
    }
}

/// Present value of the projected cash flows plus the discounted terminal
/// value.
///
/// Assumes `assumptions` already validated.
#[must_use]
pub fn enterprise_value(
    free_cash_flow: Decimal,
    assumptions: &DcfAssumptions,
    growth_rate: Decimal,
) -> Option<Decimal> {
    let growth = Decimal::ONE.checked_add(growth_rate)?;
    let discount = Decimal::ONE.checked_add(assumptions.discount_rate)?;

    let mut projected = free_cash_flow;
    let mut factor = Decimal::ONE;
    let mut present = Decimal::ZERO;
    for _ in 0..assumptions.horizon_years {
        projected = projected.checked_mul(growth)?;
        factor = factor.checked_mul(discount)?;
        present = present.checked_add(projected.checked_div(factor)?)?;
    }

    let spread = assumptions
        .discount_rate
        .checked_sub(assumptions.terminal_growth_rate)?;
    let terminal = projected
        .checked_mul(Decimal::ONE.checked_add(assumptions.terminal_growth_rate)?)?
        .checked_div(spread)?;
    present.checked_add(terminal.checked_div(factor)?)
}

/// DCF fair value per share.
///
/// `Ok(None)` when the series lacks operating cash flow, capital
/// expenditures or a positive share count (or, under
/// [`NetDebtPolicy::Subtract`], debt and cash).
///
/// # Errors
/// [`ValuationError::InvalidAssumptions`] from
/// [`DcfAssumptions::validate`], checked before the series is read.
pub fn dcf_fair_value(
    series: &FinancialSeries,
    assumptions: &DcfAssumptions,
) -> Result<Option<Decimal>, ValuationError> {
    assumptions.validate()?;
    let Some(inputs) = DcfInputs::from_series(series, assumptions.net_debt) else {
        trace!("dcf inputs incomplete");
        return Ok(None);
    };
    Ok(inputs.per_share(assumptions, assumptions.growth_rate))
}

/// Growth rate at which the DCF fair value equals `price`.
///
/// Bisection over [`IMPLIED_GROWTH_FLOOR`, `IMPLIED_GROWTH_CEILING`]. Absent
/// when the inputs are incomplete, free cash flow is not positive, or the
/// price lies outside the values reachable within the bounds.
///
/// # Errors
/// [`ValuationError::InvalidAssumptions`] as for [`dcf_fair_value`].
pub fn implied_growth(
    series: &FinancialSeries,
    assumptions: &DcfAssumptions,
    price: Decimal,
) -> Result<Option<Decimal>, ValuationError> {
    assumptions.validate()?;
    let Some(inputs) = DcfInputs::from_series(series, assumptions.net_debt) else {
        return Ok(None);
    };
    if inputs.free_cash_flow <= Decimal::ZERO {
        return Ok(None);
    }
    Ok(bisect(|g| inputs.per_share(assumptions, g), price))
}

/// Solves `value(g) == target` for an increasing `value`.
fn bisect(value: impl Fn(Decimal) -> Option<Decimal>, target: Decimal) -> Option<Decimal> {
    let mut low = IMPLIED_GROWTH_FLOOR;
    let mut high = IMPLIED_GROWTH_CEILING;
    if value(low)? > target || value(high)? < target {
        return None;
    }

    let two = Decimal::TWO;
    let mut mid = low;
    for _ in 0..IMPLIED_GROWTH_MAX_ITERATIONS {
        mid = low.checked_add(high)?.checked_div(two)?;
        let diff = value(mid)?.checked_sub(target)?;
        if diff.abs() <= IMPLIED_GROWTH_TOLERANCE {
            break;
        }
        if diff.is_sign_negative() {
            low = mid;
        } else {
            high = mid;
        }
    }
    Some(mid.round_dp(4))
}
