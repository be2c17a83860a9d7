//! Adaptive retry around the plateau search.
//!
//! Near bracket boundaries the best-ROI plateau can collapse to a sliver at
//! the bottom of the range, or stretch to cover all of it. When the
//! recommended utilization falls outside the target band, the search is
//! repeated with tighter or wider tolerance bands and the alternates are
//! ranked against the held result by a fixed priority of rules.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::calculator::{ContextProvider, TaxCalculator};
use crate::optimize::engine::{optimize_deduction, OptimizeInput};
use crate::optimize::model::*;
use crate::optimize::params::{OptimizerParams, RetryPolicy};
use crate::types::{Money, Rate};
use crate::TaxGlideResult;

/// Sweet-spot figures of one search, used to rank alternates.
struct Candidate {
    result: OptimizationResult,
    roi_percent: Decimal,
    utilization: Rate,
    tax_saved: Money,
}

impl Candidate {
    fn from_result(result: OptimizationResult) -> Option<Self> {
        let utilization = result.utilization()?;
        let spot = result.sweet_spot.as_ref()?;
        let roi_percent =
            spot.tax_saved_absolute / Decimal::from(spot.deduction) * Decimal::ONE_HUNDRED;
        let tax_saved = spot.tax_saved_absolute;
        Some(Candidate {
            result,
            roi_percent,
            utilization,
            tax_saved,
        })
    }

    fn attempt(&self) -> RetryAttempt {
        RetryAttempt {
            tolerance_bp: self.result.tolerance_bp,
            roi_percent: self.roi_percent.round_dp(2),
            deduction: self
                .result
                .sweet_spot
                .as_ref()
                .map_or(0, |spot| spot.deduction),
            utilization_ratio: self.utilization,
            tax_saved: self.tax_saved,
        }
    }
}

/// Alternate tolerances to try, nearest to the initial one first. Every
/// alternate lies strictly on the `direction` side of `initial_bp`.
pub fn alternate_tolerances(
    initial_bp: Decimal,
    direction: RetryDirection,
    policy: &RetryPolicy,
) -> Vec<Decimal> {
    let base = if initial_bp > Decimal::ZERO {
        initial_bp
    } else {
        policy.tolerance_floor_bp
    };
    let (multipliers, bound) = match direction {
        RetryDirection::Tighter => (&policy.tighter_multipliers, policy.tolerance_floor_bp),
        RetryDirection::Wider => (&policy.wider_multipliers, policy.tolerance_ceiling_bp),
    };

    let mut out: Vec<Decimal> = Vec::with_capacity(multipliers.len());
    for m in multipliers {
        let raw = base * *m;
        // Clamping may land on the wrong side of the initial tolerance.
        let (t, keeps_direction) = match direction {
            RetryDirection::Tighter => {
                let t = raw.max(bound);
                (t, t < initial_bp)
            }
            RetryDirection::Wider => {
                let t = raw.min(bound);
                (t, t > initial_bp)
            }
        };
        if keeps_direction && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

/// Decide whether `candidate` should replace `held`. Rules apply in strict
/// priority order; the first that matches wins.
fn select(held: &Candidate, candidate: &Candidate, policy: &RetryPolicy) -> Option<SelectionReason> {
    let roi_loss = held.roi_percent - candidate.roi_percent;
    let held_in = policy.in_target_range(held.utilization);
    let candidate_in = policy.in_target_range(candidate.utilization);

    if !held_in && candidate_in {
        return Some(SelectionReason::EnteredTargetRange);
    }
    if held_in && !candidate_in {
        return None;
    }
    if held.utilization > policy.utilization_cap
        && candidate.utilization < policy.utilization_cap
        && roi_loss <= policy.cap_crossing_max_roi_loss
    {
        return Some(SelectionReason::DroppedBelowUtilizationCap);
    }
    if held.tax_saved > Decimal::ZERO {
        if candidate.tax_saved >= held.tax_saved * Decimal::from(5)
            && roi_loss <= policy.savings_5x_max_roi_loss
        {
            return Some(SelectionReason::SavingsFiveFold);
        }
        if candidate.tax_saved >= held.tax_saved * Decimal::from(3)
            && roi_loss <= policy.savings_3x_max_roi_loss
        {
            return Some(SelectionReason::SavingsThreeFold);
        }
    }
    if held.utilization > Decimal::ZERO
        && candidate.utilization >= held.utilization * Decimal::TWO
        && roi_loss <= policy.utilization_2x_max_roi_loss
    {
        return Some(SelectionReason::UtilizationDoubled);
    }
    if candidate.roi_percent > held.roi_percent + policy.min_roi_gain {
        return Some(SelectionReason::HigherRoi);
    }
    None
}

/// Run the plateau search, then retry with alternate tolerances when the
/// recommended utilization misses the target band.
///
/// Calculator failures in the initial search propagate. A failure inside an
/// alternate search only skips that alternate and is recorded in
/// `adaptive_retry_info.failed_attempts`; any other error still propagates.
pub fn optimize_deduction_adaptive<C>(
    input: &OptimizeInput,
    params: &OptimizerParams,
    policy: &RetryPolicy,
    calc: &C,
    context: Option<&dyn ContextProvider>,
) -> TaxGlideResult<OptimizationResult>
where
    C: TaxCalculator + ?Sized,
{
    let initial = optimize_deduction(input, params, calc, context)?;

    if !policy.enabled || input.income < policy.min_income_for_retry {
        return Ok(initial);
    }
    let Some(held) = Candidate::from_result(initial.clone()) else {
        return Ok(initial);
    };
    if policy.in_target_range(held.utilization) {
        return Ok(initial);
    }

    let original_utilization = held.utilization;
    let original_roi = held.roi_percent;
    let direction = if original_utilization > policy.target_utilization_max {
        RetryDirection::Tighter
    } else {
        RetryDirection::Wider
    };
    let tolerances = alternate_tolerances(params.tolerance_bp, direction, policy);
    debug!(
        utilization = %original_utilization,
        ?direction,
        alternates = tolerances.len(),
        "utilization outside target, retrying"
    );

    let mut held = held;
    let mut chosen: Option<SelectionReason> = None;
    let mut attempts = Vec::with_capacity(tolerances.len());
    let mut failed_attempts = Vec::new();

    for tolerance_bp in tolerances {
        let alternate = params.with_tolerance_bp(tolerance_bp);
        let result = match optimize_deduction(input, &alternate, calc, context) {
            Ok(result) => result,
            Err(e) if e.is_calculator_failure() => {
                warn!(tolerance_bp = %tolerance_bp, error = %e, "alternate tolerance skipped");
                failed_attempts.push(FailedAttempt {
                    tolerance_bp,
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };
        let Some(candidate) = Candidate::from_result(result) else {
            failed_attempts.push(FailedAttempt {
                tolerance_bp,
                reason: "no sweet spot".to_string(),
            });
            continue;
        };
        attempts.push(candidate.attempt());

        if let Some(reason) = select(&held, &candidate, policy) {
            info!(
                tolerance_bp = %tolerance_bp,
                utilization = %candidate.utilization,
                ?reason,
                "alternate tolerance adopted"
            );
            held = candidate;
            chosen = Some(reason);
        }
    }

    let retry_info = AdaptiveRetryInfo {
        original_utilization,
        direction,
        attempts,
        failed_attempts,
        improvement_found: chosen.is_some(),
    };

    let mut result = held.result;
    if let Some(selection_reason) = chosen {
        result.adaptive_retry_used = Some(AdaptiveRetryUsed {
            original_tolerance_bp: params.tolerance_bp,
            chosen_tolerance_bp: result.tolerance_bp,
            roi_improvement: (held.roi_percent - original_roi).round_dp(4),
            utilization_improvement: held.utilization - original_utilization,
            selection_reason,
        });
    }
    result.adaptive_retry_info = Some(retry_info);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate(utilization: Decimal, roi_percent: Decimal, tax_saved: Decimal) -> Candidate {
        Candidate {
            result: OptimizationResult {
                income: dec!(100000),
                max_deduction: 10000,
                tolerance_bp: dec!(10),
                base_total: dec!(0),
                best_rate: None,
                plateau: None,
                sweet_spot: None,
                local_marginals: None,
                federal_nudge: None,
                utilization_warning: None,
                diagnostics: vec![],
                adaptive_retry_used: None,
                adaptive_retry_info: None,
                tolerance_info: None,
            },
            roi_percent,
            utilization,
            tax_saved,
        }
    }

    #[test]
    fn test_wider_tolerances_respect_ceiling() {
        let policy = RetryPolicy::default();
        let t = alternate_tolerances(dec!(25), RetryDirection::Wider, &policy);
        assert_eq!(t, vec![dec!(50), dec!(75), dec!(100)]);
    }

    #[test]
    fn test_tighter_tolerances_respect_floor() {
        let policy = RetryPolicy::default();
        let t = alternate_tolerances(dec!(4), RetryDirection::Tighter, &policy);
        assert_eq!(t, vec![dec!(2), dec!(1.2), dec!(1)]);
    }

    #[test]
    fn test_clamped_tolerances_never_reverse_direction() {
        let policy = RetryPolicy::default();
        assert!(alternate_tolerances(dec!(200), RetryDirection::Wider, &policy).is_empty());
        assert!(alternate_tolerances(dec!(100), RetryDirection::Wider, &policy).is_empty());
        assert!(alternate_tolerances(dec!(0.5), RetryDirection::Tighter, &policy).is_empty());
        assert!(alternate_tolerances(dec!(0), RetryDirection::Tighter, &policy).is_empty());
        assert_eq!(
            alternate_tolerances(dec!(0), RetryDirection::Wider, &policy),
            vec![dec!(2), dec!(3), dec!(5), dec!(10)]
        );
    }

    #[test]
    fn test_entering_target_range_ignores_roi_cost() {
        let policy = RetryPolicy::default();
        let held = candidate(dec!(0.05), dec!(40), dec!(200));
        let cand = candidate(dec!(0.30), dec!(20), dec!(600));
        assert_eq!(
            select(&held, &cand, &policy),
            Some(SelectionReason::EnteredTargetRange)
        );
    }

    #[test]
    fn test_leaving_target_range_rejected() {
        let policy = RetryPolicy::default();
        let held = candidate(dec!(0.30), dec!(30), dec!(900));
        let cand = candidate(dec!(0.80), dec!(30), dec!(2400));
        assert_eq!(select(&held, &cand, &policy), None);
    }

    #[test]
    fn test_cap_crossing_bounded_by_roi_loss() {
        let policy = RetryPolicy::default();
        let held = candidate(dec!(0.90), dec!(30), dec!(2700));
        let small_loss = candidate(dec!(0.48), dec!(29), dec!(1392));
        let large_loss = candidate(dec!(0.48), dec!(25), dec!(1200));
        assert_eq!(
            select(&held, &small_loss, &policy),
            Some(SelectionReason::DroppedBelowUtilizationCap)
        );
        assert_eq!(select(&held, &large_loss, &policy), None);
    }

    #[test]
    fn test_savings_multiples_tolerate_scaled_loss() {
        let policy = RetryPolicy::default();
        let held = candidate(dec!(0.02), dec!(40), dec!(100));
        let five_fold = candidate(dec!(0.12), dec!(32), dec!(500));
        let three_fold = candidate(dec!(0.08), dec!(36), dec!(300));
        let three_fold_costly = candidate(dec!(0.08), dec!(33), dec!(300));
        assert_eq!(
            select(&held, &five_fold, &policy),
            Some(SelectionReason::SavingsFiveFold)
        );
        assert_eq!(
            select(&held, &three_fold, &policy),
            Some(SelectionReason::SavingsThreeFold)
        );
        assert_eq!(select(&held, &three_fold_costly, &policy), None);
    }

    #[test]
    fn test_doubled_utilization_and_higher_roi() {
        let policy = RetryPolicy::default();
        let held = candidate(dec!(0.05), dec!(40), dec!(200));
        let doubled = candidate(dec!(0.10), dec!(39.5), dec!(395));
        let better_roi = candidate(dec!(0.06), dec!(40.5), dec!(243));
        let marginal_roi = candidate(dec!(0.06), dec!(40.005), dec!(240));
        assert_eq!(
            select(&held, &doubled, &policy),
            Some(SelectionReason::UtilizationDoubled)
        );
        assert_eq!(
            select(&held, &better_roi, &policy),
            Some(SelectionReason::HigherRoi)
        );
        assert_eq!(select(&held, &marginal_roi, &policy), None);
    }
}
