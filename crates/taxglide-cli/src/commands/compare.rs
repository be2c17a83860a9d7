use clap::Args;
use serde_json::{json, Value};

use taxglide_core::optimize::scan::compare_brackets;

use super::{IncomeArgs, ScheduleArgs};

/// Arguments for a before/after bracket comparison
#[derive(Args)]
pub struct CompareArgs {
    #[command(flatten)]
    pub income: IncomeArgs,

    /// Deduction to apply at both tiers
    #[arg(long)]
    pub deduction: u64,

    #[command(flatten)]
    pub schedule: ScheduleArgs,
}

pub fn run_compare(args: CompareArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let incomes = args.income.resolve()?;
    incomes.check_deduction("deduction", args.deduction)?;
    let calc = args.schedule.build()?;
    let view = calc.with_incomes(incomes);

    let comparison = compare_brackets(view.base_income(), args.deduction, &view)?;
    let after = view.incomes_at(comparison.new_income);
    let mut value = serde_json::to_value(comparison)?;
    if let Value::Object(ref mut map) = value {
        map.insert("incomes_before".into(), json!(incomes));
        map.insert("incomes_after".into(), json!(after));
    }
    Ok(value)
}
