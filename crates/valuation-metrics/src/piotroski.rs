//! Piotroski F-Score.
//!
//! The score compares the latest fiscal year `Y` with `Y - 1`. A criterion is
//! only evaluated when every concept it reads has an annual value in both
//! years; otherwise it is reported as [`CriterionOutcome::NotEvaluable`] and
//! neither passes nor fails.

use rust_decimal::Decimal;
use tracing::debug;
use valuation_core::{
    ConceptKey, CriterionOutcome, CriterionResult, FinancialSeries, PiotroskiBreakdown,
    PiotroskiCriterion,
};

use crate::inputs::{annual, gross_profit, ratio};

/// Annual values for one fiscal year.
#[derive(Debug, Clone, Copy)]
struct Year<'a> {
    series: &'a FinancialSeries,
    year: i32,
}

impl Year<'_> {
    fn get(&self, concept: ConceptKey) -> Option<Decimal> {
        annual(self.series, concept, self.year)
    }

    fn net_income(&self) -> Option<Decimal> {
        self.get(ConceptKey::NetIncome)
    }

    fn operating_cash_flow(&self) -> Option<Decimal> {
        self.get(ConceptKey::OperatingCashFlow)
    }

    fn return_on_assets(&self) -> Option<Decimal> {
        ratio(self.net_income(), self.get(ConceptKey::TotalAssets))
    }

    fn leverage(&self) -> Option<Decimal> {
        ratio(
            self.get(ConceptKey::TotalLiabilities),
            self.get(ConceptKey::TotalAssets),
        )
    }

    fn current_ratio(&self) -> Option<Decimal> {
        ratio(
            self.get(ConceptKey::CurrentAssets),
            self.get(ConceptKey::CurrentLiabilities),
        )
    }

    fn gross_margin(&self) -> Option<Decimal> {
        ratio(
            gross_profit(self.series, self.year),
            self.get(ConceptKey::Revenue),
        )
    }

    fn asset_turnover(&self) -> Option<Decimal> {
        ratio(self.get(ConceptKey::Revenue), self.get(ConceptKey::TotalAssets))
    }
}

/// Scores the series.
///
/// An empty series or one without any annual value yields
/// [`PiotroskiBreakdown::not_evaluable`].
#[must_use]
pub fn piotroski(series: &FinancialSeries) -> PiotroskiBreakdown {
    let Some(current_year) = series.latest_fiscal_year() else {
        return PiotroskiBreakdown::not_evaluable();
    };
    let current = Year {
        series,
        year: current_year,
    };
    let prior = Year {
        series,
        year: current_year - 1,
    };

    let criteria: Vec<CriterionResult> = PiotroskiCriterion::all()
        .into_iter()
        .map(|criterion| CriterionResult {
            criterion,
            outcome: evaluate(criterion, &current, &prior),
        })
        .collect();

    let breakdown = PiotroskiBreakdown {
        current_year: Some(current.year),
        prior_year: Some(prior.year),
        criteria,
    };
    debug!(
        year = current.year,
        score = ?breakdown.score(),
        evaluable = breakdown.evaluable_count(),
        "piotroski scored"
    );
    breakdown
}

fn evaluate(criterion: PiotroskiCriterion, current: &Year<'_>, prior: &Year<'_>) -> CriterionOutcome {
    let passed = match criterion {
        PiotroskiCriterion::PositiveNetIncome => level(current, prior, Year::net_income, |ni| {
            ni > Decimal::ZERO
        }),
        PiotroskiCriterion::PositiveOperatingCashFlow => {
            level(current, prior, Year::operating_cash_flow, |ocf| {
                ocf > Decimal::ZERO
            })
        }
        PiotroskiCriterion::ImprovingReturnOnAssets => {
            change(current, prior, Year::return_on_assets, |now, then| now > then)
        }
        PiotroskiCriterion::CashFlowExceedsNetIncome => {
            let accrual = |y: &Year<'_>| {
                let ocf = y.operating_cash_flow()?;
                let ni = y.net_income()?;
                ocf.checked_sub(ni)
            };
            level(current, prior, accrual, |excess| excess > Decimal::ZERO)
        }
        PiotroskiCriterion::DecreasingLeverage => {
            change(current, prior, Year::leverage, |now, then| now < then)
        }
        PiotroskiCriterion::ImprovingCurrentRatio => {
            change(current, prior, Year::current_ratio, |now, then| now > then)
        }
        PiotroskiCriterion::NoNewShares => change(
            current,
            prior,
            |y| y.get(ConceptKey::SharesOutstanding),
            |now, then| now <= then,
        ),
        PiotroskiCriterion::ImprovingGrossMargin => {
            change(current, prior, Year::gross_margin, |now, then| now > then)
        }
        PiotroskiCriterion::ImprovingAssetTurnover => {
            change(current, prior, Year::asset_turnover, |now, then| now > then)
        }
    };
    match passed {
        Some(true) => CriterionOutcome::Passed,
        Some(false) => CriterionOutcome::Failed,
        None => CriterionOutcome::NotEvaluable,
    }
}

/// A test on the current year only, evaluable when the input exists in both.
fn level<'a>(
    current: &Year<'a>,
    prior: &Year<'a>,
    input: impl Fn(&Year<'a>) -> Option<Decimal>,
    test: impl Fn(Decimal) -> bool,
) -> Option<bool> {
    input(prior)?;
    input(current).map(test)
}

/// A year-over-year comparison.
fn change<'a>(
    current: &Year<'a>,
    prior: &Year<'a>,
    input: impl Fn(&Year<'a>) -> Option<Decimal>,
    test: impl Fn(Decimal, Decimal) -> bool,
) -> Option<bool> {
    let then = input(prior)?;
    let now = input(current)?;
    Some(test(now, then))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use valuation_core::{DatedValue, FilingType, Unit};

    fn put(series: &mut FinancialSeries, concept: ConceptKey, year: i32, value: Decimal) {
        let unit = if concept == ConceptKey::SharesOutstanding {
            Unit::Shares
        } else {
            Unit::usd()
        };
        series.insert(
            concept,
            DatedValue::new(
                NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
                value,
                unit,
                FilingType::Annual,
            ),
        );
    }

    fn two_years(rows: &[(ConceptKey, Decimal, Decimal)]) -> FinancialSeries {
        let mut s = FinancialSeries::new();
        for &(concept, prior, current) in rows {
            put(&mut s, concept, 2022, prior);
            put(&mut s, concept, 2023, current);
        }
        s
    }

    /// Two years where every criterion improves.
    const IMPROVING: [(ConceptKey, Decimal, Decimal); 9] = [
        (ConceptKey::NetIncome, dec!(8), dec!(12)),
        (ConceptKey::OperatingCashFlow, dec!(10), dec!(16)),
        (ConceptKey::TotalAssets, dec!(100), dec!(105)),
        (ConceptKey::TotalLiabilities, dec!(60), dec!(55)),
        (ConceptKey::CurrentAssets, dec!(30), dec!(36)),
        (ConceptKey::CurrentLiabilities, dec!(20), dec!(20)),
        (ConceptKey::SharesOutstanding, dec!(10), dec!(10)),
        (ConceptKey::Revenue, dec!(80), dec!(100)),
        (ConceptKey::GrossProfit, dec!(32), dec!(45)),
    ];

    fn improving() -> FinancialSeries {
        two_years(&IMPROVING)
    }

    #[test]
    fn test_all_criteria_pass() {
        let breakdown = piotroski(&improving());
        assert_eq!(breakdown.current_year, Some(2023));
        assert_eq!(breakdown.prior_year, Some(2022));
        assert_eq!(breakdown.score(), Some(9));
        assert_eq!(breakdown.not_evaluable_criteria().count(), 0);
    }

    #[test]
    fn test_missing_prior_cash_flow() {
        let rows: Vec<_> = IMPROVING
            .into_iter()
            .filter(|(c, _, _)| *c != ConceptKey::OperatingCashFlow)
            .collect();
        let mut s = two_years(&rows);
        put(&mut s, ConceptKey::OperatingCashFlow, 2023, dec!(16));

        let breakdown = piotroski(&s);
        let flagged: Vec<_> = breakdown.not_evaluable_criteria().collect();
        assert_eq!(
            flagged,
            vec![
                PiotroskiCriterion::PositiveOperatingCashFlow,
                PiotroskiCriterion::CashFlowExceedsNetIncome
            ]
        );
        assert_eq!(breakdown.score(), Some(7));
    }

    #[test]
    fn test_deteriorating_company() {
        let mut s = FinancialSeries::new();
        for (concept, prior, current) in [
            (ConceptKey::NetIncome, dec!(12), dec!(-4)),
            (ConceptKey::OperatingCashFlow, dec!(16), dec!(-6)),
            (ConceptKey::TotalAssets, dec!(100), dec!(90)),
            (ConceptKey::TotalLiabilities, dec!(50), dec!(60)),
            (ConceptKey::CurrentAssets, dec!(36), dec!(20)),
            (ConceptKey::CurrentLiabilities, dec!(20), dec!(25)),
            (ConceptKey::SharesOutstanding, dec!(10), dec!(12)),
            (ConceptKey::Revenue, dec!(100), dec!(70)),
            (ConceptKey::CostOfRevenue, dec!(55), dec!(50)),
        ] {
            put(&mut s, concept, 2022, prior);
            put(&mut s, concept, 2023, current);
        }
        let breakdown = piotroski(&s);
        assert_eq!(breakdown.evaluable_count(), 9);
        assert_eq!(breakdown.score(), Some(0));
    }

    #[test]
    fn test_empty_series_has_no_score() {
        let breakdown = piotroski(&FinancialSeries::new());
        assert_eq!(breakdown.score(), None);
        assert_eq!(breakdown.criteria.len(), 9);
        assert_eq!(breakdown.current_year, None);
    }

    #[test]
    fn test_single_year_has_no_score() {
        let mut s = FinancialSeries::new();
        put(&mut s, ConceptKey::NetIncome, 2023, dec!(12));
        put(&mut s, ConceptKey::OperatingCashFlow, 2023, dec!(16));
        let breakdown = piotroski(&s);
        assert_eq!(breakdown.evaluable_count(), 0);
        assert_eq!(breakdown.score(), None);
    }

    #[test]
    fn test_zero_denominator_not_evaluable() {
        let rows: Vec<_> = IMPROVING
            .into_iter()
            .map(|(c, prior, current)| {
                if c == ConceptKey::CurrentLiabilities {
                    (c, Decimal::ZERO, current)
                } else {
                    (c, prior, current)
                }
            })
            .collect();
        let s = two_years(&rows);
        let breakdown = piotroski(&s);
        assert_eq!(
            breakdown.outcome(PiotroskiCriterion::ImprovingCurrentRatio),
            CriterionOutcome::NotEvaluable
        );
        assert_eq!(breakdown.score(), Some(8));
    }
}
