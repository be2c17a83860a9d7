use clap::Args;
use serde_json::Value;

use super::{IncomeArgs, ScheduleArgs};

/// Arguments for a single tax calculation
#[derive(Args)]
pub struct CalcArgs {
    #[command(flatten)]
    pub income: IncomeArgs,

    #[command(flatten)]
    pub schedule: ScheduleArgs,
}

pub fn run_calc(args: CalcArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let incomes = args.income.resolve()?;
    let calc = args.schedule.build()?;
    let breakdown = calc.breakdown_split(incomes)?;
    Ok(serde_json::to_value(breakdown)?)
}
