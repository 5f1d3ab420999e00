//! Gap-filling merge of regulator data with secondary market data.

use tracing::debug;

use crate::filing::Source;
use crate::types::FinancialSeries;

/// Merges `secondary` into `primary` without overwriting anything.
///
/// For every (concept, period end) that `primary` lacks, the secondary value
/// is imported and tagged [`Source::Secondary`]. Values `primary` already
/// holds are kept as-is, even when the secondary figure differs.
#[must_use]
pub fn reconcile(primary: FinancialSeries, secondary: FinancialSeries) -> FinancialSeries {
    let mut merged = primary;
    let mut imported = 0usize;

    for (concept, value) in secondary.iter() {
        if merged.contains(concept, value.period_end) {
            continue;
        }
        if merged.insert(concept, value.clone().with_source(Source::Secondary)) {
            imported += 1;
        }
    }

    debug!(imported, total = merged.len(), "reconciled secondary data");
    merged
}
