use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::calculator::TaxCalculator;
use crate::error::TaxGlideError;
use crate::optimize::params::OptimizerParams;
use crate::types::{Deduction, Money, Rate};
use crate::TaxGlideResult;

const MARGINAL_SPAN: Decimal = dec!(100);

/// Reject inputs that make the search meaningless. Runs before any call to
/// the calculator.
pub fn validate_inputs(
    income: Money,
    max_deduction: Deduction,
    step: Deduction,
    params: &OptimizerParams,
) -> TaxGlideResult<()> {
    if income < Decimal::ZERO {
        return Err(TaxGlideError::invalid(
            "income",
            "Income must be non-negative",
        ));
    }
    if step == 0 {
        return Err(TaxGlideError::invalid("step", "Step must be positive"));
    }
    if params.fine_step == 0 {
        return Err(TaxGlideError::invalid(
            "fine_step",
            "Fine step must be positive",
        ));
    }
    if params.tolerance_bp < Decimal::ZERO {
        return Err(TaxGlideError::invalid(
            "tolerance_bp",
            "Tolerance must be non-negative",
        ));
    }
    if params.max_realistic_roi <= Decimal::ZERO {
        return Err(TaxGlideError::invalid(
            "max_realistic_roi",
            "Realistic ROI ceiling must be positive",
        ));
    }
    // An empty ceiling is a no-search-space outcome, not a range error.
    if max_deduction > 0 && max_deduction < params.min_deduction {
        return Err(TaxGlideError::invalid(
            "max_deduction",
            format!(
                "Max deduction must be >= min deduction ({} < {})",
                max_deduction, params.min_deduction
            ),
        ));
    }
    if Decimal::from(max_deduction) > income {
        return Err(TaxGlideError::invalid(
            "max_deduction",
            format!("Max deduction {max_deduction} cannot exceed income {income}"),
        ));
    }
    Ok(())
}

/// Deduction grid: multiples of `step` in `[lower, upper]`, never zero.
pub fn grid(lower: Deduction, upper: Deduction, step: Deduction) -> impl Iterator<Item = Deduction> {
    let first = lower.max(1).div_ceil(step) * step;
    let stride = usize::try_from(step).unwrap_or(usize::MAX);
    (first..=upper).step_by(stride)
}

/// `deduction / max_deduction`; undefined for an empty range.
pub fn utilization_ratio(deduction: Deduction, max_deduction: Deduction) -> Option<Rate> {
    if max_deduction == 0 {
        return None;
    }
    Some(Decimal::from(deduction) / Decimal::from(max_deduction))
}

/// Marginal rate just below `income`, in percent, by finite difference over
/// the smaller of 100 units or the income itself.
pub fn local_marginal_percent<C>(calc: &C, income: Money) -> TaxGlideResult<Decimal>
where
    C: TaxCalculator + ?Sized,
{
    let span = MARGINAL_SPAN.min(income);
    if span <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let upper = calc.tax(income)?.total;
    let lower = calc.tax(income - span)?.total;
    Ok(((upper - lower) / span * Decimal::ONE_HUNDRED).round_dp(2))
}
