use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculator::{BracketContext, ContextProvider, TaxCalculator};
use crate::optimize::model::*;
use crate::optimize::params::OptimizerParams;
use crate::optimize::validation::{grid, local_marginal_percent, utilization_ratio, validate_inputs};
use crate::types::{to_percent, Deduction, Money};
use crate::TaxGlideResult;

/// Relative ROI difference below which two points count as tied.
const TIE_RELATIVE_TOLERANCE: Decimal = dec!(0.000000000001);
const BASIS_POINTS: Decimal = dec!(10000);
const HUNDRED: Decimal = dec!(100);
const LOW_UTILIZATION: Decimal = dec!(0.10);
const HIGH_UTILIZATION: Decimal = dec!(0.90);

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// The deduction space to search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeInput {
    pub income: Money,
    pub max_deduction: Deduction,
    /// Coarse grid spacing.
    pub step: Deduction,
}

// ---------------------------------------------------------------------------
// Point evaluation
// ---------------------------------------------------------------------------

/// Evaluate one deduction against the baseline. Every scan phase goes
/// through here so a given deduction always yields the same ROI.
pub fn evaluate_deduction<C>(
    calc: &C,
    income: Money,
    base_total: Money,
    deduction: Deduction,
) -> TaxGlideResult<RoiPoint>
where
    C: TaxCalculator + ?Sized,
{
    let d = Decimal::from(deduction);
    let new_income = income - d;
    let total_tax = calc.tax(new_income)?.total;
    let tax_saved = base_total - total_tax;
    let roi = if deduction == 0 {
        Decimal::ZERO
    } else {
        tax_saved / d
    };
    Ok(RoiPoint {
        deduction,
        new_income,
        total_tax,
        tax_saved,
        roi,
    })
}

/// Higher ROI wins; on a tie the smaller deduction wins.
fn beats(candidate: &RoiPoint, incumbent: &RoiPoint) -> bool {
    let margin = incumbent.roi.abs() * TIE_RELATIVE_TOLERANCE;
    if candidate.roi > incumbent.roi + margin {
        return true;
    }
    (candidate.roi - incumbent.roi).abs() <= margin && candidate.deduction < incumbent.deduction
}

fn is_realistic(point: &RoiPoint, params: &OptimizerParams) -> bool {
    point.roi * HUNDRED <= params.max_realistic_roi
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Find the deduction at the upper edge of the near-maximal ROI plateau.
///
/// Runs a coarse scan at `step`, refines around the coarse optimum at
/// `fine_step`, then sweeps the whole range at `fine_step` to bound the
/// plateau. Calculator failures propagate unchanged. The calculator is
/// called many times with the same income; wrap expensive calculators in
/// [`CachedCalculator`](crate::calculator::CachedCalculator).
pub fn optimize_deduction<C>(
    input: &OptimizeInput,
    params: &OptimizerParams,
    calc: &C,
    context: Option<&dyn ContextProvider>,
) -> TaxGlideResult<OptimizationResult>
where
    C: TaxCalculator + ?Sized,
{
    let income = input.income;
    let max_deduction = input.max_deduction;
    validate_inputs(income, max_deduction, input.step, params)?;

    let base_total = calc.tax(income)?.total;
    let mut result = OptimizationResult {
        income,
        max_deduction,
        tolerance_bp: params.tolerance_bp,
        base_total,
        best_rate: None,
        plateau: None,
        sweet_spot: None,
        local_marginals: None,
        federal_nudge: None,
        utilization_warning: None,
        diagnostics: Vec::new(),
        adaptive_retry_used: None,
        adaptive_retry_info: None,
        tolerance_info: None,
    };

    if max_deduction == 0 {
        result
            .diagnostics
            .push("no search space: max_deduction is 0".to_string());
        return Ok(result);
    }

    // Coarse scan
    let mut filtered = 0usize;
    let mut best: Option<RoiPoint> = None;
    for d in grid(params.min_deduction, max_deduction, input.step) {
        let point = evaluate_deduction(calc, income, base_total, d)?;
        if !is_realistic(&point, params) {
            filtered += 1;
            continue;
        }
        if best.as_ref().map_or(true, |b| beats(&point, b)) {
            best = Some(point);
        }
    }
    let Some(mut best) = best else {
        result.diagnostics.push(format!(
            "no search space: no realistic ROI point between {} and {} (step {})",
            params.min_deduction, max_deduction, input.step
        ));
        return Ok(result);
    };
    debug!(deduction = best.deduction, roi = %best.roi, "coarse optimum");

    // Fine scan around the coarse optimum
    let window_lo = best
        .deduction
        .saturating_sub(params.fine_window)
        .max(params.min_deduction);
    let window_hi = best
        .deduction
        .saturating_add(params.fine_window)
        .min(max_deduction);
    for d in grid(window_lo, window_hi, params.fine_step) {
        let point = evaluate_deduction(calc, income, base_total, d)?;
        if !is_realistic(&point, params) {
            filtered += 1;
            continue;
        }
        if beats(&point, &best) {
            best = point;
        }
    }
    debug!(deduction = best.deduction, roi = %best.roi, "refined optimum");

    // Plateau sweep over the whole range
    let tolerance = params.tolerance_bp / BASIS_POINTS;
    let (mut min_d, mut max_d) = (best.deduction, best.deduction);
    let (mut roi_min, mut roi_max) = (best.roi, best.roi);
    for d in grid(params.min_deduction, max_deduction, params.fine_step) {
        let point = evaluate_deduction(calc, income, base_total, d)?;
        if !is_realistic(&point, params) {
            filtered += 1;
            continue;
        }
        if (point.roi - best.roi).abs() <= tolerance {
            min_d = min_d.min(d);
            max_d = max_d.max(d);
            roi_min = roi_min.min(point.roi);
            roi_max = roi_max.max(point.roi);
        }
    }
    let plateau = Plateau {
        min_d,
        max_d,
        roi_min_percent: to_percent(roi_min),
        roi_max_percent: to_percent(roi_max),
        tolerance_bp: params.tolerance_bp,
    };
    debug!(min_d, max_d, tolerance_bp = %params.tolerance_bp, "plateau");
    if filtered > 0 {
        result.diagnostics.push(format!(
            "{filtered} evaluations above {}% ROI ignored as rounding artefacts",
            params.max_realistic_roi
        ));
    }

    // Sweet spot at the upper plateau edge
    let spot_deduction = plateau.max_d;
    let new_income = income - Decimal::from(spot_deduction);
    let at_spot = calc.tax(new_income)?;
    let tax_saved = base_total - at_spot.total;
    let roi = tax_saved / Decimal::from(spot_deduction);
    let tax_saved_percent = if base_total > Decimal::ZERO {
        to_percent(tax_saved / base_total)
    } else {
        Decimal::ZERO
    };

    let why = match context {
        Some(provider) => Some(explain_brackets(
            &provider.context(income)?,
            &provider.context(new_income)?,
            new_income,
        )),
        None => None,
    };

    let local_marginals = LocalMarginals {
        at_best_rate_percent: local_marginal_percent(calc, best.new_income)?,
        at_sweet_spot_percent: local_marginal_percent(calc, new_income)?,
    };

    let federal_nudge = match at_spot.federal {
        Some(federal) => federal_nudge(calc, new_income, federal, spot_deduction, max_deduction)?,
        None => None,
    };

    let explanation = narrate(spot_deduction, new_income, tax_saved, roi, &plateau, why.as_ref());
    let roi_percent = to_percent(roi);

    result.utilization_warning = utilization_ratio(spot_deduction, max_deduction)
        .and_then(|u| utilization_warning(u, roi_percent));
    result.sweet_spot = Some(SweetSpot {
        deduction: spot_deduction,
        new_income,
        total_tax_at_spot: at_spot.total,
        federal_tax_at_spot: at_spot.federal,
        tax_saved_absolute: tax_saved,
        tax_saved_percent,
        roi_percent,
        explanation,
        why,
    });
    result.best_rate = Some(best);
    result.plateau = Some(plateau);
    result.local_marginals = Some(local_marginals);
    result.federal_nudge = federal_nudge;
    Ok(result)
}

// ---------------------------------------------------------------------------
// Narration helpers
// ---------------------------------------------------------------------------

fn explain_brackets(
    before: &BracketContext,
    after: &BracketContext,
    new_income: Money,
) -> BracketExplanation {
    let federal_changed = before.federal_segment != after.federal_segment;
    let local_changed = before.local_bracket != after.local_bracket;

    // Segment lookup truncates income, so leaving a segment needs income < from.
    let additional_to_lower_federal = match (&after.federal_segment, federal_changed) {
        (Some(seg), false) if seg.from > 0 => {
            distance_below(new_income, Decimal::from(seg.from))
        }
        _ => None,
    };
    // Local brackets are half-open above `lower`.
    let additional_to_lower_local = match (&after.local_bracket, local_changed) {
        (Some(b), false) if b.lower > 0 => distance_to(new_income, Decimal::from(b.lower)),
        _ => None,
    };

    BracketExplanation {
        federal_bracket_before: before.federal_segment.clone(),
        federal_bracket_after: after.federal_segment.clone(),
        federal_bracket_changed: federal_changed,
        local_bracket_before: before.local_bracket.clone(),
        local_bracket_after: after.local_bracket.clone(),
        local_bracket_changed: local_changed,
        additional_to_lower_federal,
        additional_to_lower_local,
    }
}

/// Smallest whole deduction that takes `income` strictly below `bound`.
fn distance_below(income: Money, bound: Money) -> Option<Deduction> {
    if income < bound {
        return None;
    }
    ((income - bound).floor() + Decimal::ONE).to_u64()
}

/// Smallest whole deduction that takes `income` to `target` or below.
fn distance_to(income: Money, target: Money) -> Option<Deduction> {
    if income <= target {
        return None;
    }
    (income - target).ceil().to_u64()
}

fn federal_nudge<C>(
    calc: &C,
    new_income: Money,
    federal_at_spot: Money,
    deduction: Deduction,
    max_deduction: Deduction,
) -> TaxGlideResult<Option<FederalNudge>>
where
    C: TaxCalculator + ?Sized,
{
    let over = new_income - (new_income / HUNDRED).floor() * HUNDRED;
    let nudge = match over.ceil().to_u64() {
        Some(n) if n > 0 && deduction + n <= max_deduction => n,
        _ => return Ok(None),
    };
    let nudged = calc.tax(new_income - Decimal::from(nudge))?;
    Ok(nudged
        .federal
        .map(|federal| federal_at_spot - federal)
        .filter(|saving| *saving > Decimal::ZERO)
        .map(|estimated_federal_saving| FederalNudge {
            nudge,
            estimated_federal_saving,
        }))
}

fn utilization_warning(utilization: Decimal, roi_percent: Decimal) -> Option<UtilizationWarning> {
    let utilization_percent = to_percent(utilization);
    if utilization <= LOW_UTILIZATION {
        Some(UtilizationWarning {
            kind: UtilizationWarningKind::LowUtilization,
            utilization_percent,
            roi_percent,
            message: format!(
                "Only {utilization_percent}% of the deduction ceiling is recommended; \
                 larger deductions return noticeably less per unit."
            ),
        })
    } else if utilization >= HIGH_UTILIZATION {
        Some(UtilizationWarning {
            kind: UtilizationWarningKind::HighUtilization,
            utilization_percent,
            roi_percent,
            message: format!(
                "{utilization_percent}% of the deduction ceiling is recommended; \
                 the return per unit is nearly flat across the range."
            ),
        })
    } else {
        None
    }
}

fn narrate(
    deduction: Deduction,
    new_income: Money,
    tax_saved: Money,
    roi: Decimal,
    plateau: &Plateau,
    why: Option<&BracketExplanation>,
) -> String {
    let mut text = format!(
        "Deducting {deduction} lowers taxable income to {new_income} and saves {} \
         ({}% return on the deduction).",
        tax_saved.round_dp(2),
        to_percent(roi)
    );
    if plateau.width() > 0 {
        text.push_str(&format!(
            " ROI stays within {} bp of the best rate from {} to {}; this is the upper edge.",
            plateau.tolerance_bp, plateau.min_d, plateau.max_d
        ));
    }
    if let Some(why) = why {
        if why.federal_bracket_changed {
            text.push_str(" The deduction moves income into a lower federal segment.");
        } else if let Some(extra) = why.additional_to_lower_federal {
            text.push_str(&format!(
                " A further {extra} would reach the next lower federal segment."
            ));
        }
        if why.local_bracket_changed {
            text.push_str(" The deduction moves income into a lower local bracket.");
        }
    }
    text
}
