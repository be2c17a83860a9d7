use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculator::{BracketContext, ContextProvider, FederalSegmentInfo, TaxCalculator};
use crate::error::TaxGlideError;
use crate::optimize::engine::evaluate_deduction;
use crate::optimize::validation::local_marginal_percent;
use crate::types::{to_percent, Deduction, Money};
use crate::TaxGlideResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One row of a deduction scan table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRow {
    pub deduction: Deduction,
    pub new_income: Money,
    pub total_tax: Money,
    pub saved: Money,
    pub roi_percent: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federal: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federal_segment: Option<FederalSegmentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_marginal_percent: Option<Decimal>,
}

/// Bracket position before and after a deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketComparison {
    pub income: Money,
    pub deduction: Deduction,
    pub new_income: Money,
    pub before: BracketContext,
    pub after: BracketContext,
    pub federal_changed: bool,
    pub local_changed: bool,
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// Tabulate tax, savings and ROI for d = 0, d_step, 2*d_step, ... up to
/// `max_deduction`.
pub fn scan_deductions<C>(
    income: Money,
    max_deduction: Deduction,
    d_step: Deduction,
    calc: &C,
    context: Option<&dyn ContextProvider>,
    include_local_marginal: bool,
) -> TaxGlideResult<Vec<ScanRow>>
where
    C: TaxCalculator + ?Sized,
{
    if income < Decimal::ZERO {
        return Err(TaxGlideError::invalid(
            "income",
            "Income must be non-negative",
        ));
    }
    if d_step == 0 {
        return Err(TaxGlideError::invalid("d_step", "Step must be positive"));
    }
    if Decimal::from(max_deduction) > income {
        return Err(TaxGlideError::invalid(
            "max_deduction",
            format!("Max deduction {max_deduction} cannot exceed income {income}"),
        ));
    }

    let base_total = calc.tax(income)?.total;
    let stride = usize::try_from(d_step).unwrap_or(usize::MAX);
    let mut rows = Vec::new();
    for d in (0..=max_deduction).step_by(stride) {
        let point = evaluate_deduction(calc, income, base_total, d)?;
        let federal = calc.tax(point.new_income)?.federal;
        let federal_segment = match context {
            Some(provider) => provider.context(point.new_income)?.federal_segment,
            None => None,
        };
        let local_marginal_percent = if include_local_marginal {
            Some(local_marginal_percent(calc, point.new_income)?)
        } else {
            None
        };
        rows.push(ScanRow {
            deduction: d,
            new_income: point.new_income,
            total_tax: point.total_tax,
            saved: point.tax_saved,
            roi_percent: to_percent(point.roi),
            federal,
            federal_segment,
            local_marginal_percent,
        });
    }
    debug!(rows = rows.len(), d_step, "deduction scan");
    Ok(rows)
}

/// Report which brackets `income` and `income - deduction` fall into.
pub fn compare_brackets(
    income: Money,
    deduction: Deduction,
    context: &dyn ContextProvider,
) -> TaxGlideResult<BracketComparison> {
    let d = Decimal::from(deduction);
    if d > income {
        return Err(TaxGlideError::invalid(
            "deduction",
            format!("Deduction {deduction} cannot exceed income {income}"),
        ));
    }
    let new_income = income - d;
    let before = context.context(income)?;
    let after = context.context(new_income)?;
    Ok(BracketComparison {
        income,
        deduction,
        new_income,
        federal_changed: before.federal_segment != after.federal_segment,
        local_changed: before.local_bracket != after.local_bracket,
        before,
        after,
    })
}
