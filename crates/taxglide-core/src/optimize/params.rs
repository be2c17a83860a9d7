//! Tunable thresholds for the optimizer and the adaptive retry controller.
//!
//! Every magic number of the search lives here and is passed in explicitly;
//! nothing downstream carries its own defaults.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::optimize::model::{ToleranceInfo, ToleranceSource};
use crate::types::{Deduction, Money, Rate};

/// Parameters for a single plateau search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerParams {
    /// Plateau band around the best ROI, in basis points of ROI.
    pub tolerance_bp: Decimal,
    /// Smallest deduction considered.
    pub min_deduction: Deduction,
    /// Half-width of the refinement window around the coarse optimum.
    pub fine_window: Deduction,
    /// Grid spacing for refinement and plateau detection.
    pub fine_step: Deduction,
    /// Points whose ROI in percent exceeds this are treated as rounding spikes.
    pub max_realistic_roi: Decimal,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        OptimizerParams {
            tolerance_bp: dec!(10),
            min_deduction: 100,
            fine_window: 500,
            fine_step: 10,
            max_realistic_roi: dec!(100),
        }
    }
}

impl OptimizerParams {
    pub fn with_tolerance_bp(&self, tolerance_bp: Decimal) -> Self {
        OptimizerParams {
            tolerance_bp,
            ..self.clone()
        }
    }
}

/// Default tolerance for incomes below `below`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToleranceBand {
    pub below: Money,
    pub tolerance_bp: Decimal,
}

/// Income-dependent starting tolerance, used when the caller does not fix
/// one. Bands are checked in order; the first whose bound lies above the
/// income applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveTolerance {
    pub bands: Vec<ToleranceBand>,
    /// Applies at and above the last band's bound.
    pub top_bp: Decimal,
}

impl Default for AdaptiveTolerance {
    fn default() -> Self {
        AdaptiveTolerance {
            bands: vec![
                ToleranceBand {
                    below: dec!(50000),
                    tolerance_bp: dec!(10),
                },
                ToleranceBand {
                    below: dec!(100000),
                    tolerance_bp: dec!(20),
                },
            ],
            top_bp: dec!(50),
        }
    }
}

impl AdaptiveTolerance {
    pub fn for_income(&self, income: Money) -> Decimal {
        self.bands
            .iter()
            .find(|band| income < band.below)
            .map_or(self.top_bp, |band| band.tolerance_bp)
    }

    /// Pick the tolerance for a run: `explicit` when given, the income band
    /// otherwise.
    pub fn resolve(&self, explicit: Option<Decimal>, income: Money) -> ToleranceInfo {
        let (tolerance_bp, tolerance_source, explanation) = match explicit {
            Some(bp) => (
                bp,
                ToleranceSource::UserSpecified,
                format!("{bp} bp set explicitly"),
            ),
            None => {
                let bp = self.for_income(income);
                let explanation = match self.bands.iter().find(|band| income < band.below) {
                    Some(band) => format!("{bp} bp default for incomes below {}", band.below),
                    None => format!(
                        "{bp} bp default for incomes of {} and above",
                        self.bands.last().map_or(Decimal::ZERO, |band| band.below)
                    ),
                };
                (bp, ToleranceSource::IncomeAdaptive, explanation)
            }
        };
        ToleranceInfo {
            tolerance_used_bp: tolerance_bp,
            tolerance_percent: tolerance_bp / Decimal::ONE_HUNDRED,
            tolerance_source,
            explanation,
        }
    }
}

/// Thresholds for the adaptive retry controller.
///
/// ROI losses and gains are in percentage points of ROI, utilizations are
/// ratios of the maximum deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub min_income_for_retry: Money,
    pub target_utilization_min: Rate,
    pub target_utilization_max: Rate,
    pub utilization_cap: Rate,
    /// Applied to the initial tolerance when utilization is above target.
    pub tighter_multipliers: Vec<Decimal>,
    pub tolerance_floor_bp: Decimal,
    /// Applied to the initial tolerance when utilization is below target.
    pub wider_multipliers: Vec<Decimal>,
    pub tolerance_ceiling_bp: Decimal,
    pub cap_crossing_max_roi_loss: Decimal,
    pub savings_3x_max_roi_loss: Decimal,
    pub savings_5x_max_roi_loss: Decimal,
    pub utilization_2x_max_roi_loss: Decimal,
    pub min_roi_gain: Decimal,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            enabled: true,
            min_income_for_retry: dec!(25000),
            target_utilization_min: dec!(0.25),
            target_utilization_max: dec!(0.45),
            utilization_cap: dec!(0.50),
            tighter_multipliers: vec![dec!(0.5), dec!(0.3), dec!(0.2), dec!(0.1)],
            tolerance_floor_bp: dec!(1),
            wider_multipliers: vec![dec!(2), dec!(3), dec!(5), dec!(10)],
            tolerance_ceiling_bp: dec!(100),
            cap_crossing_max_roi_loss: dec!(2),
            savings_3x_max_roi_loss: dec!(5),
            savings_5x_max_roi_loss: dec!(10),
            utilization_2x_max_roi_loss: dec!(1),
            min_roi_gain: dec!(0.01),
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        RetryPolicy {
            enabled: false,
            ..RetryPolicy::default()
        }
    }

    pub fn in_target_range(&self, utilization: Rate) -> bool {
        utilization >= self.target_utilization_min && utilization <= self.target_utilization_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_policy_fills_defaults() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"enabled": false, "min_income_for_retry": "40000"}"#).unwrap();
        assert!(!policy.enabled);
        assert_eq!(policy.min_income_for_retry, dec!(40000));
        assert_eq!(policy.utilization_cap, dec!(0.50));
        assert_eq!(policy.wider_multipliers.len(), 4);
    }

    #[test]
    fn test_tolerance_follows_income_band() {
        let bands = AdaptiveTolerance::default();
        assert_eq!(bands.for_income(dec!(34567)), dec!(10));
        assert_eq!(bands.for_income(dec!(50000)), dec!(20));
        assert_eq!(bands.for_income(dec!(99999.99)), dec!(20));
        assert_eq!(bands.for_income(dec!(250000)), dec!(50));
    }

    #[test]
    fn test_tolerance_source_reported() {
        let bands = AdaptiveTolerance::default();
        let adaptive = bands.resolve(None, dec!(80000));
        assert_eq!(adaptive.tolerance_used_bp, dec!(20));
        assert_eq!(adaptive.tolerance_percent, dec!(0.2));
        assert_eq!(adaptive.tolerance_source, ToleranceSource::IncomeAdaptive);
        assert!(adaptive.explanation.contains("below 100000"));

        let top = bands.resolve(None, dec!(150000));
        assert!(top.explanation.contains("100000 and above"));

        let explicit = bands.resolve(Some(dec!(35)), dec!(80000));
        assert_eq!(explicit.tolerance_used_bp, dec!(35));
        assert_eq!(explicit.tolerance_source, ToleranceSource::UserSpecified);
    }

    #[test]
    fn test_default_minimum_deduction_is_one_hundred() {
        assert_eq!(OptimizerParams::default().min_deduction, 100);
    }

    #[test]
    fn test_target_range_is_inclusive() {
        let policy = RetryPolicy::default();
        assert!(policy.in_target_range(dec!(0.25)));
        assert!(policy.in_target_range(dec!(0.45)));
        assert!(!policy.in_target_range(dec!(0.46)));
        assert!(!policy.in_target_range(dec!(0.1)));
    }
}
