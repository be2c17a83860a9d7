use clap::Args;
use serde_json::{json, Value};

use taxglide_core::optimize::scan::scan_deductions;
use taxglide_core::ContextProvider;

use super::{IncomeArgs, ScheduleArgs};

/// Arguments for a deduction scan table
#[derive(Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub income: IncomeArgs,

    /// Largest deduction to tabulate
    #[arg(long)]
    pub max_deduction: u64,

    /// Spacing between rows
    #[arg(long, default_value = "100")]
    pub d_step: u64,

    /// Add the local marginal rate at each row
    #[arg(long)]
    pub include_local_marginal: bool,

    #[command(flatten)]
    pub schedule: ScheduleArgs,
}

pub fn run_scan(args: ScanArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let incomes = args.income.resolve()?;
    incomes.check_deduction("max_deduction", args.max_deduction)?;
    let calc = args.schedule.build()?;
    let view = calc.with_incomes(incomes);
    let context: &dyn ContextProvider = &view;
    let rows = scan_deductions(
        view.base_income(),
        args.max_deduction,
        args.d_step,
        &view,
        Some(context),
        args.include_local_marginal,
    )?;

    if incomes.is_uniform() {
        return Ok(serde_json::to_value(rows)?);
    }
    // Rows carry the local income; add the federal one alongside.
    let mut table = Vec::with_capacity(rows.len());
    for row in rows {
        let federal = view.incomes_at(row.new_income).federal;
        let mut value = serde_json::to_value(row)?;
        if let Value::Object(ref mut map) = value {
            map.insert("new_income_federal".into(), json!(federal));
        }
        table.push(value);
    }
    Ok(Value::Array(table))
}
