//! Reference two-tier progressive schedule.
//!
//! A federal per-hundred table plus a sub-national portion-of-bracket table
//! scaled by locally selected multipliers. Built once from a validated
//! [`ScheduleConfig`] and then shared read-only with the optimizer.

pub mod config;
pub mod federal;
pub mod local;
pub mod two_tier;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::Money;

pub use config::{FederalByStatus, FilingStatus, Multiplier, ScheduleConfig};
pub use federal::{FederalRounding, FederalSchedule, FederalSegment, StepMode};
pub use local::{FlatOverride, LocalBracket, LocalSchedule};
pub use two_tier::{IncomeSplit, SplitIncome, TaxBreakdown, TwoTierCalculator};

/// Nearest multiple of `increment`, halves rounded up. 0 leaves the amount as is.
pub fn round_to_increment(amount: Money, increment: u64) -> Money {
    if increment == 0 {
        return amount;
    }
    let q = Decimal::from(increment);
    (amount / q).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * q
}

/// Whole currency units of a non-negative income.
pub(crate) fn whole_units(income: Money) -> u64 {
    if income <= Decimal::ZERO {
        return 0;
    }
    income.trunc().to_u64().unwrap_or(u64::MAX)
}

/// `local_simple * sum(selected rates)`; nothing selected means no local tax.
pub fn apply_multipliers(local_simple: Money, multipliers: &[Multiplier], picks: &[String]) -> Money {
    let sum: Decimal = multipliers
        .iter()
        .filter(|m| picks.iter().any(|p| *p == m.code))
        .map(|m| m.rate)
        .sum();
    local_simple * sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn mult(code: &str, rate: Decimal) -> Multiplier {
        Multiplier {
            name: code.to_string(),
            code: code.to_string(),
            rate,
            exclusive_group: None,
            optional: false,
            default_selected: true,
        }
    }

    #[test]
    fn test_round_to_increment_half_up() {
        assert_eq!(round_to_increment(dec!(12.5), 5), dec!(15));
        assert_eq!(round_to_increment(dec!(12.4), 5), dec!(10));
        assert_eq!(round_to_increment(dec!(12.4), 0), dec!(12.4));
    }

    #[test]
    fn test_multipliers_sum_selected_rates() {
        let ms = vec![mult("KANTON", dec!(1.05)), mult("GEMEINDE", dec!(1.38)), mult("FEUER", dec!(0.14))];
        let picks = vec!["KANTON".to_string(), "GEMEINDE".to_string()];
        assert_eq!(apply_multipliers(dec!(1000), &ms, &picks), dec!(2430));
        assert_eq!(apply_multipliers(dec!(1000), &ms, &[]), dec!(0));
    }

    #[test]
    fn test_whole_units() {
        assert_eq!(whole_units(dec!(1234.99)), 1234);
        assert_eq!(whole_units(dec!(-5)), 0);
    }
}
