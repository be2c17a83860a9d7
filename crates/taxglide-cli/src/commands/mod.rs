pub mod calc;
pub mod compare;
pub mod optimize;
pub mod scan;
pub mod validate;

use clap::{Args, ValueEnum};
use rust_decimal::Decimal;

use taxglide_core::schedule::{FilingStatus, IncomeSplit, ScheduleConfig, TwoTierCalculator};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FilingStatusArg {
    Single,
    MarriedJoint,
}

impl From<FilingStatusArg> for FilingStatus {
    fn from(arg: FilingStatusArg) -> Self {
        match arg {
            FilingStatusArg::Single => FilingStatus::Single,
            FilingStatusArg::MarriedJoint => FilingStatus::MarriedJoint,
        }
    }
}

/// Taxable income, either one figure for both tiers or one per tier
#[derive(Args)]
pub struct IncomeArgs {
    /// Taxable income at both tiers
    #[arg(long)]
    pub income: Option<Decimal>,

    /// Taxable income at the local tier (requires --income-federal)
    #[arg(long, alias = "income-sg")]
    pub income_local: Option<Decimal>,

    /// Taxable income at the federal tier (requires --income-local)
    #[arg(long, alias = "income-fed")]
    pub income_federal: Option<Decimal>,
}

impl IncomeArgs {
    pub fn resolve(&self) -> Result<IncomeSplit, String> {
        match (self.income, self.income_local, self.income_federal) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                Err("Cannot specify both --income and --income-local/--income-federal".into())
            }
            (Some(income), None, None) => Ok(IncomeSplit::uniform(income)),
            (None, Some(local), Some(federal)) => Ok(IncomeSplit { local, federal }),
            (None, Some(_), None) | (None, None, Some(_)) => Err(
                "When using separate incomes, both --income-local and --income-federal \
                 must be provided"
                    .into(),
            ),
            (None, None, None) => {
                Err("Must provide either --income, or both --income-local and --income-federal"
                    .into())
            }
        }
    }
}

/// Schedule selection shared by every command that evaluates tax
#[derive(Args)]
pub struct ScheduleArgs {
    /// Path to a JSON or YAML schedule file (schedule on stdin otherwise)
    #[arg(long)]
    pub schedule: Option<String>,

    /// Federal table to apply
    #[arg(long, value_enum, default_value = "single")]
    pub filing_status: FilingStatusArg,

    /// Multiplier code to select in addition to the defaults (repeatable)
    #[arg(long)]
    pub pick: Vec<String>,

    /// Optional multiplier code to deselect (repeatable, wins over --pick)
    #[arg(long)]
    pub skip: Vec<String>,
}

impl ScheduleArgs {
    /// Build the calculator once; it is shared by reference from here on.
    pub fn build(&self) -> Result<TwoTierCalculator, Box<dyn std::error::Error>> {
        let config = load_schedule(self.schedule.as_deref())?;
        let picks = config.resolve_picks(&self.pick, &self.skip)?;
        tracing::debug!(
            filing_status = ?self.filing_status,
            picks = ?picks,
            "schedule loaded"
        );
        Ok(TwoTierCalculator::new(
            &config,
            self.filing_status.into(),
            picks,
        )?)
    }
}

pub fn load_schedule(path: Option<&str>) -> Result<ScheduleConfig, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        input::file::read_structured(path)
    } else if let Some(config) = input::stdin::read_piped()? {
        Ok(config)
    } else {
        Err("--schedule <file.json|file.yaml> or a schedule piped on stdin required".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incomes(
        income: Option<i64>,
        local: Option<i64>,
        federal: Option<i64>,
    ) -> Result<IncomeSplit, String> {
        IncomeArgs {
            income: income.map(Decimal::from),
            income_local: local.map(Decimal::from),
            income_federal: federal.map(Decimal::from),
        }
        .resolve()
    }

    #[test]
    fn test_single_income_applies_to_both_tiers() {
        let split = incomes(Some(60000), None, None).unwrap();
        assert_eq!(split, IncomeSplit::uniform(Decimal::from(60000)));
    }

    #[test]
    fn test_separate_incomes() {
        let split = incomes(None, Some(58000), Some(60000)).unwrap();
        assert_eq!(split.local, Decimal::from(58000));
        assert_eq!(split.federal, Decimal::from(60000));
    }

    #[test]
    fn test_missing_income_rejected() {
        let err = incomes(None, None, None).unwrap_err();
        assert!(err.starts_with("Must provide either --income"));
    }

    #[test]
    fn test_half_a_split_rejected() {
        for err in [
            incomes(None, Some(58000), None).unwrap_err(),
            incomes(None, None, Some(60000)).unwrap_err(),
        ] {
            assert!(err.contains("both --income-local and --income-federal must be provided"));
        }
    }

    #[test]
    fn test_mixed_forms_rejected() {
        for err in [
            incomes(Some(60000), Some(58000), None).unwrap_err(),
            incomes(Some(60000), None, Some(60000)).unwrap_err(),
            incomes(Some(60000), Some(58000), Some(60000)).unwrap_err(),
        ] {
            assert!(err.starts_with("Cannot specify both --income and"));
        }
    }
}
