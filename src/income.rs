// 💰 Family Income Aggregator
//
// family.total_income == Σ income (None as 0) of citizens linked to the family.
// Recomputed after every membership change and after edits to a linked
// citizen's income.

use crate::error::CivicResult;
use crate::store::CivicStore;
use tracing::{debug, error};

/// Sum of incomes, missing values counted as zero
pub fn sum_incomes<I>(incomes: I) -> f64
where
    I: IntoIterator<Item = Option<f64>>,
{
    incomes.into_iter().map(|income| income.unwrap_or(0.0)).sum()
}

/// Recompute and persist the family's total income, returning it.
///
/// A family id that does not exist yields 0. Storage failures, on the read
/// or the write side, are returned to the caller.
pub fn recalculate_income<S>(store: &S, family_id: &str) -> CivicResult<f64>
where
    S: CivicStore + ?Sized,
{
    match store.recompute_family_income(family_id) {
        Ok(total) => {
            debug!(family_id, total, "family income recomputed");
            Ok(total)
        }
        Err(e) => {
            error!(family_id, error = %e, "family income recompute failed");
            Err(e)
        }
    }
}
