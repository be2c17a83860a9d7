use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculator::FederalSegmentInfo;
use crate::error::TaxGlideError;
use crate::schedule::{round_to_increment, whole_units};
use crate::types::Money;
use crate::TaxGlideResult;

/// How partial `step_size` blocks above a segment's anchor are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// Every started block is charged.
    #[default]
    Ceil,
    /// Only completed blocks are charged.
    Floor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederalRounding {
    pub per_100_step: bool,
    pub step_size: u64,
    pub step_mode: StepMode,
    /// Round the final tax to this increment, half-up. 0 disables.
    pub tax_round_to: u64,
}

impl Default for FederalRounding {
    fn default() -> Self {
        FederalRounding {
            per_100_step: true,
            step_size: 100,
            step_mode: StepMode::Ceil,
            tax_round_to: 0,
        }
    }
}

/// `tax = base_tax_at + per100 * units`, units counted from `at_income`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalSegment {
    pub from: u64,
    #[serde(default)]
    pub to: Option<u64>,
    pub at_income: u64,
    pub base_tax_at: Money,
    pub per100: Money,
}

impl FederalSegment {
    fn contains(&self, income: u64) -> bool {
        income >= self.from && self.to.map_or(true, |to| income <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalSchedule {
    #[serde(default)]
    pub rounding: FederalRounding,
    pub segments: Vec<FederalSegment>,
}

impl FederalSchedule {
    /// First segment with `from <= income <= to`; the last segment when the
    /// income lies above every segment.
    pub fn segment_for_income(&self, income: u64) -> Option<&FederalSegment> {
        self.segments
            .iter()
            .find(|seg| seg.contains(income))
            .or_else(|| self.segments.last())
    }

    /// Federal tax on the whole-unit part of `income`.
    pub fn tax(&self, income: Money) -> TaxGlideResult<Money> {
        let i = whole_units(income);
        let seg = self
            .segment_for_income(i)
            .ok_or_else(|| TaxGlideError::CalculatorFailure {
                income,
                reason: "federal schedule has no segments".into(),
            })?;

        let rounding = &self.rounding;
        let tax = if rounding.per_100_step && rounding.step_size > 0 {
            let delta = i.saturating_sub(seg.at_income);
            let units = match rounding.step_mode {
                StepMode::Ceil => delta.div_ceil(rounding.step_size),
                StepMode::Floor => delta / rounding.step_size,
            };
            seg.base_tax_at + seg.per100 * Decimal::from(units)
        } else {
            seg.base_tax_at
        };
        Ok(round_to_increment(tax, rounding.tax_round_to))
    }

    /// Marginal rate aligned to full hundreds:
    /// `(T(h) - T(h - 100)) / 100` with `h = ceil(i / 100) * 100`.
    pub fn marginal_hundreds(&self, income: Money) -> TaxGlideResult<Decimal> {
        let h = whole_units(income).div_ceil(100) * 100;
        let upper = self.tax(Decimal::from(h))?;
        let lower = self.tax(Decimal::from(h.saturating_sub(100)))?;
        Ok((upper - lower) / Decimal::ONE_HUNDRED)
    }

    pub fn segment_info(&self, income: Money) -> Option<FederalSegmentInfo> {
        self.segment_for_income(whole_units(income))
            .map(|seg| FederalSegmentInfo {
                from: seg.from,
                to: seg.to,
                per100: seg.per100,
                at_income: seg.at_income,
            })
    }

    pub fn validate(&self, label: &str) -> TaxGlideResult<()> {
        if self.segments.is_empty() {
            return Err(TaxGlideError::InvalidSchedule(format!(
                "federal ({label}): at least one segment is required"
            )));
        }
        if self.rounding.per_100_step && self.rounding.step_size == 0 {
            return Err(TaxGlideError::InvalidSchedule(format!(
                "federal ({label}): step_size must be > 0"
            )));
        }
        let last = self.segments.len() - 1;
        for (idx, seg) in self.segments.iter().enumerate() {
            if seg.per100 < Decimal::ZERO || seg.base_tax_at < Decimal::ZERO {
                return Err(TaxGlideError::InvalidSchedule(format!(
                    "federal ({label}): segment {idx} has a negative rate or base"
                )));
            }
            match seg.to {
                Some(to) if to < seg.from => {
                    return Err(TaxGlideError::InvalidSchedule(format!(
                        "federal ({label}): segment {idx} ends before it starts"
                    )));
                }
                None if idx != last => {
                    return Err(TaxGlideError::InvalidSchedule(format!(
                        "federal ({label}): only the last segment may be open-ended"
                    )));
                }
                _ => {}
            }
        }
        for (idx, pair) in self.segments.windows(2).enumerate() {
            let prev_to = pair[0].to.unwrap_or(u64::MAX);
            // Segments may share their boundary income; the earlier one wins.
            if pair[1].from < prev_to {
                return Err(TaxGlideError::InvalidSchedule(format!(
                    "federal ({label}): segments {idx} and {} overlap",
                    idx + 1
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn schedule(step_mode: StepMode) -> FederalSchedule {
        FederalSchedule {
            rounding: FederalRounding {
                step_mode,
                ..FederalRounding::default()
            },
            segments: vec![
                FederalSegment {
                    from: 0,
                    to: Some(30000),
                    at_income: 0,
                    base_tax_at: dec!(0),
                    per100: dec!(0),
                },
                FederalSegment {
                    from: 30000,
                    to: Some(60000),
                    at_income: 30000,
                    base_tax_at: dec!(100),
                    per100: dec!(2),
                },
                FederalSegment {
                    from: 60000,
                    to: None,
                    at_income: 60000,
                    base_tax_at: dec!(700),
                    per100: dec!(5),
                },
            ],
        }
    }

    #[test]
    fn test_ceil_counts_started_hundreds() {
        let s = schedule(StepMode::Ceil);
        assert_eq!(s.tax(dec!(30000)).unwrap(), dec!(0));
        assert_eq!(s.tax(dec!(30001)).unwrap(), dec!(102));
        assert_eq!(s.tax(dec!(30100)).unwrap(), dec!(102));
        assert_eq!(s.tax(dec!(30101)).unwrap(), dec!(104));
    }

    #[test]
    fn test_floor_counts_completed_hundreds() {
        let s = schedule(StepMode::Floor);
        assert_eq!(s.tax(dec!(30099)).unwrap(), dec!(100));
        assert_eq!(s.tax(dec!(30100)).unwrap(), dec!(102));
    }

    #[test]
    fn test_fractional_income_truncated() {
        let s = schedule(StepMode::Ceil);
        assert_eq!(s.tax(dec!(30100.99)).unwrap(), dec!(102));
    }

    #[test]
    fn test_marginal_hundreds() {
        let s = schedule(StepMode::Ceil);
        assert_eq!(s.marginal_hundreds(dec!(45050)).unwrap(), dec!(0.02));
        assert_eq!(s.marginal_hundreds(dec!(70000)).unwrap(), dec!(0.05));
    }

    #[test]
    fn test_open_ended_segment_info() {
        let s = schedule(StepMode::Ceil);
        let info = s.segment_info(dec!(90000)).unwrap();
        assert_eq!(info.from, 60000);
        assert_eq!(info.to, None);
    }

    #[test]
    fn test_overlap_rejected() {
        let mut s = schedule(StepMode::Ceil);
        s.segments[1].from = 20000;
        let err = s.validate("single").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_negative_rate_rejected() {
        let mut s = schedule(StepMode::Ceil);
        s.segments[2].per100 = dec!(-1);
        assert!(s.validate("single").is_err());
    }
}
