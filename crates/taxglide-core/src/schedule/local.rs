use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculator::LocalBracketInfo;
use crate::error::TaxGlideError;
use crate::schedule::round_to_increment;
use crate::types::Money;
use crate::TaxGlideResult;

/// Portion of income in `(lower, lower + width]` taxed at `rate_percent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBracket {
    pub lower: u64,
    pub width: u64,
    pub rate_percent: Decimal,
}

impl LocalBracket {
    fn upper(&self) -> u64 {
        self.lower.saturating_add(self.width)
    }
}

/// Above `threshold` the whole income is taxed at `percent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatOverride {
    pub threshold: u64,
    pub percent: Decimal,
}

/// Sub-national progressive schedule producing the "simple tax" that the
/// multipliers are applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSchedule {
    /// Round the simple tax to this increment, half-up. 0 disables.
    #[serde(default)]
    pub tax_round_to: u64,
    pub brackets: Vec<LocalBracket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat_override: Option<FlatOverride>,
}

impl LocalSchedule {
    fn override_for(&self, income: Money) -> Option<&FlatOverride> {
        self.flat_override
            .as_ref()
            .filter(|o| income > Decimal::from(o.threshold))
    }

    pub fn simple_tax(&self, income: Money) -> Money {
        if let Some(flat) = self.override_for(income) {
            let tax = income * flat.percent / Decimal::ONE_HUNDRED;
            return round_to_increment(tax, self.tax_round_to);
        }

        let mut tax = Decimal::ZERO;
        for bracket in &self.brackets {
            let lower = Decimal::from(bracket.lower);
            if income <= lower {
                continue;
            }
            let upper = Decimal::from(bracket.upper());
            let portion = income.min(upper) - lower;
            tax += portion * bracket.rate_percent / Decimal::ONE_HUNDRED;
            if income <= upper {
                break;
            }
        }
        round_to_increment(tax, self.tax_round_to)
    }

    /// Bracket holding the last unit of `income`.
    pub fn bracket_info(&self, income: Money) -> Option<LocalBracketInfo> {
        if let Some(flat) = self.override_for(income) {
            return Some(LocalBracketInfo {
                lower: flat.threshold,
                upper: None,
                rate_percent: flat.percent,
            });
        }
        let bracket = self
            .brackets
            .iter()
            .find(|b| income <= Decimal::from(b.upper()))
            .or_else(|| self.brackets.last())?;
        Some(LocalBracketInfo {
            lower: bracket.lower,
            upper: Some(bracket.upper()),
            rate_percent: bracket.rate_percent,
        })
    }

    pub fn validate(&self) -> TaxGlideResult<()> {
        if self.brackets.is_empty() {
            return Err(TaxGlideError::InvalidSchedule(
                "local: at least one bracket is required".into(),
            ));
        }
        for (idx, b) in self.brackets.iter().enumerate() {
            if b.width == 0 {
                return Err(TaxGlideError::InvalidSchedule(format!(
                    "local: bracket {idx} width must be > 0"
                )));
            }
            if b.rate_percent < Decimal::ZERO {
                return Err(TaxGlideError::InvalidSchedule(format!(
                    "local: bracket {idx} has a negative rate"
                )));
            }
        }
        for (idx, pair) in self.brackets.windows(2).enumerate() {
            if pair[1].lower <= pair[0].lower {
                return Err(TaxGlideError::InvalidSchedule(format!(
                    "local: bracket lowers must be strictly increasing (bracket {})",
                    idx + 1
                )));
            }
            if pair[1].lower < pair[0].upper() {
                return Err(TaxGlideError::InvalidSchedule(format!(
                    "local: brackets {idx} and {} overlap",
                    idx + 1
                )));
            }
        }
        if let Some(flat) = &self.flat_override {
            if flat.percent < Decimal::ZERO {
                return Err(TaxGlideError::InvalidSchedule(
                    "local: flat override percent must be non-negative".into(),
                ));
            }
        }
        Ok(())
    }
}
