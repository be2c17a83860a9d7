use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculator::{FederalSegmentInfo, LocalBracketInfo};
use crate::types::{Deduction, Money, Rate};

// ---------------------------------------------------------------------------
// Search points
// ---------------------------------------------------------------------------

/// One evaluated deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiPoint {
    pub deduction: Deduction,
    pub new_income: Money,
    pub total_tax: Money,
    pub tax_saved: Money,
    /// tax_saved / deduction
    pub roi: Rate,
}

/// Deductions whose ROI lies within the tolerance band of the best ROI,
/// reported as the first/last matching point in scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plateau {
    pub min_d: Deduction,
    pub max_d: Deduction,
    pub roi_min_percent: Decimal,
    pub roi_max_percent: Decimal,
    pub tolerance_bp: Decimal,
}

impl Plateau {
    pub fn width(&self) -> Deduction {
        self.max_d - self.min_d
    }

    pub fn contains(&self, deduction: Deduction) -> bool {
        deduction >= self.min_d && deduction <= self.max_d
    }
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweetSpot {
    pub deduction: Deduction,
    pub new_income: Money,
    pub total_tax_at_spot: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federal_tax_at_spot: Option<Money>,
    pub tax_saved_absolute: Money,
    /// Share of the baseline tax that is saved, in percent.
    pub tax_saved_percent: Decimal,
    pub roi_percent: Decimal,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why: Option<BracketExplanation>,
}

/// Bracket movement caused by the recommended deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketExplanation {
    pub federal_bracket_before: Option<FederalSegmentInfo>,
    pub federal_bracket_after: Option<FederalSegmentInfo>,
    pub federal_bracket_changed: bool,
    pub local_bracket_before: Option<LocalBracketInfo>,
    pub local_bracket_after: Option<LocalBracketInfo>,
    pub local_bracket_changed: bool,
    /// Further deduction needed to drop into the next lower federal segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_to_lower_federal: Option<Deduction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_to_lower_local: Option<Deduction>,
}

/// Finite-difference marginal rates, in percent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMarginals {
    pub at_best_rate_percent: Decimal,
    pub at_sweet_spot_percent: Decimal,
}

/// Extra deduction that brings the sweet-spot income down to a full hundred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalNudge {
    pub nudge: Deduction,
    pub estimated_federal_saving: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationWarningKind {
    LowUtilization,
    HighUtilization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilizationWarning {
    pub kind: UtilizationWarningKind,
    pub utilization_percent: Decimal,
    pub roi_percent: Decimal,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Adaptive retry diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDirection {
    /// Utilization above target: narrower bands pull the plateau edge in.
    Tighter,
    /// Utilization below target: wider bands push the plateau edge out.
    Wider,
}

/// Why an alternate tolerance replaced the held result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    EnteredTargetRange,
    DroppedBelowUtilizationCap,
    SavingsFiveFold,
    SavingsThreeFold,
    UtilizationDoubled,
    HigherRoi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub tolerance_bp: Decimal,
    pub roi_percent: Decimal,
    pub deduction: Deduction,
    pub utilization_ratio: Rate,
    pub tax_saved: Money,
}

/// An alternate tolerance whose search could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub tolerance_bp: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveRetryInfo {
    pub original_utilization: Rate,
    pub direction: RetryDirection,
    pub attempts: Vec<RetryAttempt>,
    pub failed_attempts: Vec<FailedAttempt>,
    pub improvement_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveRetryUsed {
    pub original_tolerance_bp: Decimal,
    pub chosen_tolerance_bp: Decimal,
    /// Percentage points of ROI, negative when ROI was given up.
    pub roi_improvement: Decimal,
    pub utilization_improvement: Rate,
    pub selection_reason: SelectionReason,
}

// ---------------------------------------------------------------------------
// Tolerance provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceSource {
    UserSpecified,
    IncomeAdaptive,
}

/// Starting tolerance of a run and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToleranceInfo {
    pub tolerance_used_bp: Decimal,
    /// Same band as a percentage of ROI.
    pub tolerance_percent: Decimal,
    pub tolerance_source: ToleranceSource,
    pub explanation: String,
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub income: Money,
    pub max_deduction: Deduction,
    pub tolerance_bp: Decimal,
    pub base_total: Money,
    pub best_rate: Option<RoiPoint>,
    pub plateau: Option<Plateau>,
    pub sweet_spot: Option<SweetSpot>,
    pub local_marginals: Option<LocalMarginals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federal_nudge: Option<FederalNudge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization_warning: Option<UtilizationWarning>,
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptive_retry_used: Option<AdaptiveRetryUsed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptive_retry_info: Option<AdaptiveRetryInfo>,
    /// Set by callers that chose the starting tolerance on the user's behalf.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance_info: Option<ToleranceInfo>,
}

impl OptimizationResult {
    /// Recommended deduction as a share of the maximum, if there is one.
    pub fn utilization(&self) -> Option<Rate> {
        let spot = self.sweet_spot.as_ref()?;
        super::validation::utilization_ratio(spot.deduction, self.max_deduction)
    }
}
