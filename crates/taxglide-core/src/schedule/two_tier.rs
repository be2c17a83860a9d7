use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculator::{BracketContext, ContextProvider, TaxAmounts, TaxCalculator};
use crate::error::TaxGlideError;
use crate::schedule::config::{FilingStatus, Multiplier, ScheduleConfig};
use crate::schedule::federal::FederalSchedule;
use crate::schedule::local::LocalSchedule;
use crate::schedule::apply_multipliers;
use crate::types::{Deduction, Money, Rate};
use crate::TaxGlideResult;

/// Taxable income at each tier. The two differ when a deduction is allowed
/// at one level only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeSplit {
    pub local: Money,
    pub federal: Money,
}

impl IncomeSplit {
    pub fn uniform(income: Money) -> Self {
        IncomeSplit {
            local: income,
            federal: income,
        }
    }

    pub fn is_uniform(&self) -> bool {
        self.local == self.federal
    }

    /// Both incomes lowered by the same amount.
    pub fn less(&self, amount: Money) -> Self {
        IncomeSplit {
            local: self.local - amount,
            federal: self.federal - amount,
        }
    }

    /// A deduction is applied at both tiers, so it may not exceed either income.
    pub fn check_deduction(&self, field: &str, deduction: Deduction) -> TaxGlideResult<()> {
        let d = Decimal::from(deduction);
        if d > self.local || d > self.federal {
            return Err(TaxGlideError::invalid(
                field,
                format!(
                    "{deduction} cannot exceed local income {} or federal income {}",
                    self.local, self.federal
                ),
            ));
        }
        Ok(())
    }

    fn check_non_negative(&self) -> TaxGlideResult<()> {
        if self.local < Decimal::ZERO || self.federal < Decimal::ZERO {
            return Err(TaxGlideError::invalid(
                "income",
                "Income must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Full tax picture at one pair of incomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub income_local: Money,
    pub income_federal: Money,
    pub filing_status: FilingStatus,
    pub federal: Money,
    pub local_simple: Money,
    pub local_after_multipliers: Money,
    pub total: Money,
    /// total / federal income
    pub avg_rate: Rate,
    /// T(incomes + 1) - T(incomes)
    pub marginal_total: Rate,
    pub marginal_federal_hundreds: Rate,
    pub picks: Vec<String>,
}

/// Federal table for one filing status plus the local table and the selected
/// multipliers. Immutable once built.
#[derive(Debug, Clone)]
pub struct TwoTierCalculator {
    filing_status: FilingStatus,
    federal: FederalSchedule,
    local: LocalSchedule,
    multipliers: Vec<Multiplier>,
    picks: Vec<String>,
}

impl TwoTierCalculator {
    /// Validate `config` and bind it to a filing status and multiplier
    /// selection. Every code in `picks` must exist in the configuration and
    /// exclusive groups must be respected.
    pub fn new(
        config: &ScheduleConfig,
        filing_status: FilingStatus,
        picks: Vec<String>,
    ) -> TaxGlideResult<Self> {
        config.validate()?;
        config.check_picks(&picks)?;
        Ok(TwoTierCalculator {
            filing_status,
            federal: config.federal.for_status(filing_status).clone(),
            local: config.local.clone(),
            multipliers: config.multipliers.clone(),
            picks,
        })
    }

    /// Calculator with the configuration's default multiplier selection.
    pub fn with_default_picks(
        config: &ScheduleConfig,
        filing_status: FilingStatus,
    ) -> TaxGlideResult<Self> {
        Self::new(config, filing_status, config.default_picks())
    }

    pub fn filing_status(&self) -> FilingStatus {
        self.filing_status
    }

    pub fn picks(&self) -> &[String] {
        &self.picks
    }

    fn components(&self, incomes: IncomeSplit) -> TaxGlideResult<(Money, Money, Money)> {
        let federal = self.federal.tax(incomes.federal)?;
        let local_simple = self.local.simple_tax(incomes.local);
        let local_after = apply_multipliers(local_simple, &self.multipliers, &self.picks);
        Ok((federal, local_simple, local_after))
    }

    /// Tax with each tier at its own income.
    pub fn tax_split(&self, incomes: IncomeSplit) -> TaxGlideResult<TaxAmounts> {
        let (federal, _, local_after) = self.components(incomes)?;
        Ok(TaxAmounts::with_federal(federal + local_after, federal))
    }

    pub fn context_split(&self, incomes: IncomeSplit) -> BracketContext {
        BracketContext {
            federal_segment: self.federal.segment_info(incomes.federal),
            local_bracket: self.local.bracket_info(incomes.local),
        }
    }

    pub fn breakdown(&self, income: Money) -> TaxGlideResult<TaxBreakdown> {
        self.breakdown_split(IncomeSplit::uniform(income))
    }

    pub fn breakdown_split(&self, incomes: IncomeSplit) -> TaxGlideResult<TaxBreakdown> {
        incomes.check_non_negative()?;
        let (federal, local_simple, local_after_multipliers) = self.components(incomes)?;
        let total = federal + local_after_multipliers;
        let avg_rate = if incomes.federal > Decimal::ZERO {
            (total / incomes.federal).round_dp(6)
        } else {
            Decimal::ZERO
        };
        let marginal_total = self.tax_split(incomes.less(-Decimal::ONE))?.total - total;
        Ok(TaxBreakdown {
            income_local: incomes.local,
            income_federal: incomes.federal,
            filing_status: self.filing_status,
            federal,
            local_simple,
            local_after_multipliers,
            total,
            avg_rate,
            marginal_total,
            marginal_federal_hundreds: self.federal.marginal_hundreds(incomes.federal)?,
            picks: self.picks.clone(),
        })
    }

    /// View over `incomes` for the optimizer and the scan: the view's single
    /// income is the local income, and the federal income moves with it.
    pub fn with_incomes(&self, incomes: IncomeSplit) -> SplitIncome<'_> {
        SplitIncome {
            calc: self,
            incomes,
        }
    }
}

impl TaxCalculator for TwoTierCalculator {
    fn tax(&self, income: Money) -> TaxGlideResult<TaxAmounts> {
        self.tax_split(IncomeSplit::uniform(income))
    }
}

impl ContextProvider for TwoTierCalculator {
    fn context(&self, income: Money) -> TaxGlideResult<BracketContext> {
        Ok(self.context_split(IncomeSplit::uniform(income)))
    }
}

/// A [`TwoTierCalculator`] bound to a pair of starting incomes. Lowering the
/// income passed to [`TaxCalculator::tax`] lowers both tiers by the same
/// amount.
#[derive(Debug, Clone, Copy)]
pub struct SplitIncome<'a> {
    calc: &'a TwoTierCalculator,
    incomes: IncomeSplit,
}

impl SplitIncome<'_> {
    /// Income to hand to the optimizer.
    pub fn base_income(&self) -> Money {
        self.incomes.local
    }

    pub fn incomes(&self) -> IncomeSplit {
        self.incomes
    }

    pub fn calculator(&self) -> &TwoTierCalculator {
        self.calc
    }

    /// Incomes after lowering the local income to `local`.
    pub fn incomes_at(&self, local: Money) -> IncomeSplit {
        self.incomes.less(self.incomes.local - local)
    }
}

impl TaxCalculator for SplitIncome<'_> {
    fn tax(&self, income: Money) -> TaxGlideResult<TaxAmounts> {
        self.calc.tax_split(self.incomes_at(income))
    }
}

impl ContextProvider for SplitIncome<'_> {
    fn context(&self, income: Money) -> TaxGlideResult<BracketContext> {
        Ok(self.calc.context_split(self.incomes_at(income)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::config::fixtures::sample;
    use rust_decimal_macros::dec;

    fn single() -> TwoTierCalculator {
        TwoTierCalculator::with_default_picks(&sample(), FilingStatus::Single).unwrap()
    }

    #[test]
    fn test_total_is_federal_plus_local() {
        let amounts = single().tax(dec!(50000)).unwrap();
        // federal: 300 started hundreds above 20000; local: 10% of 40000 * 1.0
        assert_eq!(amounts.federal, Some(dec!(300)));
        assert_eq!(amounts.total, dec!(4300));
    }

    #[test]
    fn test_breakdown_rates() {
        let b = single().breakdown(dec!(50000)).unwrap();
        assert_eq!(b.income_local, dec!(50000));
        assert_eq!(b.income_federal, dec!(50000));
        assert_eq!(b.local_simple, dec!(4000));
        assert_eq!(b.local_after_multipliers, dec!(4000));
        assert_eq!(b.avg_rate, dec!(0.086));
        // one more unit starts a new hundred: 0.1 local + 1 federal
        assert_eq!(b.marginal_total, dec!(1.1));
        assert_eq!(b.marginal_federal_hundreds, dec!(0.01));
        assert_eq!(b.picks, vec!["CANTON"]);
    }

    #[test]
    fn test_separate_incomes_tax_each_tier() {
        let calc = single();
        let split = IncomeSplit {
            local: dec!(48000),
            federal: dec!(50000),
        };
        let b = calc.breakdown_split(split).unwrap();
        // local from 48000, federal from 50000
        assert_eq!(b.local_simple, dec!(3800));
        assert_eq!(b.federal, dec!(300));
        assert_eq!(b.total, dec!(4100));
        assert_eq!(b.avg_rate, dec!(0.082));

        let uniform = calc.breakdown_split(IncomeSplit::uniform(dec!(50000))).unwrap();
        assert_eq!(uniform, calc.breakdown(dec!(50000)).unwrap());
    }

    #[test]
    fn test_split_view_lowers_both_tiers() {
        let calc = single();
        let view = calc.with_incomes(IncomeSplit {
            local: dec!(48000),
            federal: dec!(50000),
        });
        assert_eq!(view.base_income(), dec!(48000));
        // deducting 1000: local 47000, federal 49000
        let amounts = view.tax(dec!(47000)).unwrap();
        assert_eq!(amounts.federal, Some(dec!(290)));
        assert_eq!(amounts.total, dec!(290) + dec!(3700));
        let ctx = view.context(dec!(47000)).unwrap();
        assert_eq!(ctx.federal_segment.unwrap().from, 20000);
        assert_eq!(ctx.local_bracket.unwrap().lower, 10000);
    }

    #[test]
    fn test_deduction_bounded_by_smaller_income() {
        let split = IncomeSplit {
            local: dec!(9000),
            federal: dec!(8000),
        };
        assert!(split.check_deduction("max_deduction", 8000).is_ok());
        let err = split.check_deduction("max_deduction", 8500).unwrap_err();
        assert!(err.to_string().contains("federal income 8000"));
    }

    #[test]
    fn test_negative_income_rejected() {
        let split = IncomeSplit {
            local: dec!(1000),
            federal: dec!(-1),
        };
        assert!(single().breakdown_split(split).is_err());
    }

    #[test]
    fn test_extra_pick_scales_local() {
        let picks = vec!["CANTON".to_string(), "CHURCH".to_string()];
        let calc = TwoTierCalculator::new(&sample(), FilingStatus::MarriedJoint, picks).unwrap();
        assert_eq!(calc.tax(dec!(50000)).unwrap().total, dec!(5100));
    }

    #[test]
    fn test_unknown_pick_rejected() {
        let picks = vec!["NOPE".to_string()];
        assert!(TwoTierCalculator::new(&sample(), FilingStatus::Single, picks).is_err());
    }

    #[test]
    fn test_context_reports_both_tiers() {
        let ctx = single().context(dec!(15000)).unwrap();
        assert_eq!(ctx.federal_segment.unwrap().from, 0);
        assert_eq!(ctx.local_bracket.unwrap().lower, 10000);
    }
}
