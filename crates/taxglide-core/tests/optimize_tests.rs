use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use taxglide_core::optimize::{
    evaluate_deduction, optimize_deduction, OptimizeInput, OptimizerParams,
};
use taxglide_core::{CachedCalculator, Money, TaxAmounts, TaxGlideError, TaxGlideResult};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn flat_quarter(income: Money) -> TaxGlideResult<TaxAmounts> {
    Ok(TaxAmounts::total(income * dec!(0.25)))
}

/// T(x) = x^2 / 400000: ROI falls by 1 bp for every 40 units deducted.
fn quadratic(income: Money) -> TaxGlideResult<TaxAmounts> {
    Ok(TaxAmounts::total(income * income / dec!(400000)))
}

/// 30% ROI up to 1000 and again from 4000 to 4500, 20% elsewhere. A single
/// 200% spike at 4730 lies off the coarse grid and outside the refinement
/// window.
fn gapped(income: Money) -> TaxGlideResult<TaxAmounts> {
    let d = dec!(100000) - income;
    let rate = if d == dec!(4730) {
        dec!(2)
    } else if d <= dec!(1000) || (d >= dec!(4000) && d <= dec!(4500)) {
        dec!(0.3)
    } else {
        dec!(0.2)
    };
    Ok(TaxAmounts::total(dec!(30000) - d * rate))
}

fn input(income: Decimal, max_deduction: u64, step: u64) -> OptimizeInput {
    OptimizeInput {
        income,
        max_deduction,
        step,
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

#[test]
fn test_flat_rate_uses_whole_ceiling() {
    let result = optimize_deduction(
        &input(dec!(40000), 5000, 100),
        &OptimizerParams::default(),
        &flat_quarter,
        None,
    )
    .unwrap();

    let spot = result.sweet_spot.as_ref().unwrap();
    assert_eq!(spot.deduction, 5000);
    assert_eq!(spot.new_income, dec!(35000));
    assert_eq!(spot.total_tax_at_spot, dec!(8750));
    assert_eq!(spot.tax_saved_percent, dec!(12.5));
    let plateau = result.plateau.as_ref().unwrap();
    assert_eq!(plateau.max_d, 5000);
    assert_eq!(result.utilization(), Some(dec!(1)));
}

#[test]
fn test_single_step_range() {
    let result = optimize_deduction(
        &input(dec!(50000), 100, 100),
        &OptimizerParams::default(),
        &flat_quarter,
        None,
    )
    .unwrap();
    assert_eq!(result.sweet_spot.unwrap().deduction, 100);
}

#[test]
fn test_quadratic_plateau_edge() {
    let result = optimize_deduction(
        &input(dec!(100000), 10000, 100),
        &OptimizerParams::default(),
        &quadratic,
        None,
    )
    .unwrap();

    let best = result.best_rate.as_ref().unwrap();
    assert_eq!(best.deduction, 100);
    assert_eq!(best.roi, dec!(0.49975));

    // 10 bp below the best ROI is reached exactly at d = 500.
    let plateau = result.plateau.as_ref().unwrap();
    assert_eq!(plateau.min_d, 100);
    assert_eq!(plateau.max_d, 500);
    assert_eq!(result.sweet_spot.as_ref().unwrap().deduction, 500);
    assert_eq!(result.utilization(), Some(dec!(0.05)));

    let marginals = result.local_marginals.as_ref().unwrap();
    assert!(marginals.at_sweet_spot_percent < marginals.at_best_rate_percent);
}

#[test]
fn test_low_utilization_warning_raised() {
    let result = optimize_deduction(
        &input(dec!(100000), 10000, 100),
        &OptimizerParams::default(),
        &quadratic,
        None,
    )
    .unwrap();
    let warning = result.utilization_warning.unwrap();
    assert_eq!(warning.utilization_percent, dec!(5));
}

#[test]
fn test_wider_tolerance_moves_edge_out() {
    let params = OptimizerParams::default().with_tolerance_bp(dec!(100));
    let result = optimize_deduction(
        &input(dec!(100000), 10000, 100),
        &params,
        &quadratic,
        None,
    )
    .unwrap();
    assert_eq!(result.sweet_spot.unwrap().deduction, 4100);
}

#[test]
fn test_plateau_spans_gap_in_band() {
    let result = optimize_deduction(
        &input(dec!(100000), 5000, 100),
        &OptimizerParams::default(),
        &gapped,
        None,
    )
    .unwrap();

    let plateau = result.plateau.as_ref().unwrap();
    assert_eq!(plateau.min_d, 100);
    assert_eq!(plateau.max_d, 4500);
    assert_eq!(plateau.roi_min_percent, dec!(30));
    assert_eq!(plateau.roi_max_percent, dec!(30));
    // The envelope covers the 20% stretch in between.
    assert!(plateau.contains(2000));

    let spot = result.sweet_spot.as_ref().unwrap();
    assert_eq!(spot.deduction, 4500);
    assert_eq!(spot.tax_saved_absolute, dec!(1350));
}

#[test]
fn test_plateau_sweep_filters_unrealistic_points() {
    let result = optimize_deduction(
        &input(dec!(100000), 5000, 100),
        &OptimizerParams::default(),
        &gapped,
        None,
    )
    .unwrap();

    // Only the full-range sweep at the fine step reaches 4730.
    assert_eq!(
        result.diagnostics,
        vec!["1 evaluations above 100% ROI ignored as rounding artefacts".to_string()]
    );
    assert_eq!(result.best_rate.as_ref().unwrap().deduction, 100);
    assert_eq!(result.plateau.as_ref().unwrap().max_d, 4500);
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[test]
fn test_sweet_spot_inside_plateau_and_range() {
    let params = OptimizerParams {
        min_deduction: 1000,
        ..OptimizerParams::default()
    };
    let result = optimize_deduction(&input(dec!(100000), 8000, 250), &params, &quadratic, None)
        .unwrap();

    let plateau = result.plateau.as_ref().unwrap();
    let spot = result.sweet_spot.as_ref().unwrap();
    assert!(plateau.contains(spot.deduction));
    assert!(plateau.min_d >= 1000);
    assert!(plateau.max_d <= 8000);
    assert_eq!(spot.new_income, dec!(100000) - Decimal::from(spot.deduction));
    assert!(spot.new_income >= Decimal::ZERO);
}

#[test]
fn test_roi_identical_across_phases() {
    let base = quadratic(dec!(100000)).unwrap().total;
    let result = optimize_deduction(
        &input(dec!(100000), 10000, 100),
        &OptimizerParams::default(),
        &quadratic,
        None,
    )
    .unwrap();
    let best = result.best_rate.unwrap();
    let again = evaluate_deduction(&quadratic, dec!(100000), base, best.deduction).unwrap();
    assert_eq!(best, again);
}

#[test]
fn test_idempotent() {
    let run = || {
        optimize_deduction(
            &input(dec!(100000), 10000, 100),
            &OptimizerParams::default(),
            &quadratic,
            None,
        )
        .unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_cached_calculator_gives_same_result() {
    let cached = CachedCalculator::new(quadratic);
    let direct = optimize_deduction(
        &input(dec!(100000), 10000, 100),
        &OptimizerParams::default(),
        &quadratic,
        None,
    )
    .unwrap();
    let memoized = optimize_deduction(
        &input(dec!(100000), 10000, 100),
        &OptimizerParams::default(),
        &cached,
        None,
    )
    .unwrap();
    assert_eq!(direct, memoized);
    // 1000 fine points plus the baseline and the marginal differences
    assert!(cached.cached_incomes() < 1100);
}

// ---------------------------------------------------------------------------
// Empty ranges and invalid input
// ---------------------------------------------------------------------------

#[test]
fn test_zero_ceiling_is_no_search_space() {
    let result = optimize_deduction(
        &input(dec!(40000), 0, 100),
        &OptimizerParams::default(),
        &flat_quarter,
        None,
    )
    .unwrap();
    assert!(result.sweet_spot.is_none());
    assert!(result.plateau.is_none());
    assert_eq!(result.base_total, dec!(10000));
    assert!(result.diagnostics[0].starts_with("no search space"));
}

#[test]
fn test_range_below_first_grid_point_is_no_search_space() {
    let params = OptimizerParams {
        min_deduction: 50,
        ..OptimizerParams::default()
    };
    let result =
        optimize_deduction(&input(dec!(40000), 80, 100), &params, &flat_quarter, None).unwrap();
    assert!(result.sweet_spot.is_none());
    assert!(result.diagnostics[0].contains("no realistic ROI point"));
}

#[test]
fn test_invalid_inputs_rejected_before_search() {
    let calls = std::cell::Cell::new(0u32);
    let counting = |income: Money| -> TaxGlideResult<TaxAmounts> {
        calls.set(calls.get() + 1);
        Ok(TaxAmounts::total(income * dec!(0.25)))
    };
    let params = OptimizerParams::default();

    for bad in [
        input(dec!(-1), 0, 100),
        input(dec!(40000), 5000, 0),
        input(dec!(4000), 5000, 100),
        // below the default minimum deduction of 100
        input(dec!(50000), 50, 100),
    ] {
        let err = optimize_deduction(&bad, &params, &counting, None).unwrap_err();
        assert!(matches!(err, TaxGlideError::InvalidInput { .. }));
    }
    assert_eq!(calls.get(), 0);
}
