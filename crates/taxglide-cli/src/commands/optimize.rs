use std::time::Instant;

use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use taxglide_core::optimize::{
    optimize_deduction_adaptive, AdaptiveTolerance, OptimizeInput, OptimizerParams, RetryPolicy,
    ToleranceInfo,
};
use taxglide_core::{with_metadata, CachedCalculator, ContextProvider};

use super::{IncomeArgs, ScheduleArgs};
use crate::input;

/// Arguments for deduction optimization
#[derive(Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub income: IncomeArgs,

    /// Deduction ceiling
    #[arg(long)]
    pub max_deduction: u64,

    /// Coarse grid spacing
    #[arg(long, default_value = "100")]
    pub step: u64,

    /// Plateau tolerance in basis points of ROI (chosen from income when omitted)
    #[arg(long)]
    pub tolerance_bp: Option<Decimal>,

    /// Smallest deduction considered [default: 100]
    #[arg(long)]
    pub min_deduction: Option<u64>,

    /// Half-width of the refinement window around the coarse optimum
    #[arg(long)]
    pub fine_window: Option<u64>,

    /// Grid spacing for refinement and plateau detection
    #[arg(long)]
    pub fine_step: Option<u64>,

    /// ROI ceiling in percent; higher points are treated as rounding spikes
    #[arg(long)]
    pub max_realistic_roi: Option<Decimal>,

    /// Run a single search without alternate tolerances
    #[arg(long)]
    pub disable_adaptive: bool,

    /// Path to a JSON or YAML retry policy (defaults fill missing fields)
    #[arg(long)]
    pub policy: Option<String>,

    #[command(flatten)]
    pub schedule: ScheduleArgs,
}

impl OptimizeArgs {
    fn params(&self, tolerance: &ToleranceInfo) -> OptimizerParams {
        let defaults = OptimizerParams::default();
        OptimizerParams {
            tolerance_bp: tolerance.tolerance_used_bp,
            min_deduction: self.min_deduction.unwrap_or(defaults.min_deduction),
            fine_window: self.fine_window.unwrap_or(defaults.fine_window),
            fine_step: self.fine_step.unwrap_or(defaults.fine_step),
            max_realistic_roi: self.max_realistic_roi.unwrap_or(defaults.max_realistic_roi),
        }
    }

    fn policy(&self) -> Result<RetryPolicy, Box<dyn std::error::Error>> {
        let mut policy: RetryPolicy = match self.policy {
            Some(ref path) => input::file::read_structured(path)?,
            None => RetryPolicy::default(),
        };
        if self.disable_adaptive {
            policy.enabled = false;
        }
        Ok(policy)
    }
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let incomes = args.income.resolve()?;
    incomes.check_deduction("max_deduction", args.max_deduction)?;
    let tolerance = AdaptiveTolerance::default().resolve(args.tolerance_bp, incomes.local);
    let params = args.params(&tolerance);
    let policy = args.policy()?;
    let two_tier = args.schedule.build()?;
    let calc = CachedCalculator::new(two_tier.with_incomes(incomes));
    let context: &dyn ContextProvider = &calc;

    let search = OptimizeInput {
        income: incomes.local,
        max_deduction: args.max_deduction,
        step: args.step,
    };
    let mut result =
        optimize_deduction_adaptive(&search, &params, &policy, &calc, Some(context))?;
    tracing::debug!(
        evaluations = calc.cached_incomes(),
        tolerance_bp = %tolerance.tolerance_used_bp,
        "optimization finished"
    );
    result.tolerance_info = Some(tolerance);

    let mut warnings = result.diagnostics.clone();
    if let Some(ref warning) = result.utilization_warning {
        warnings.push(warning.message.clone());
    }
    let assumptions = json!({
        "incomes": incomes,
        "filing_status": two_tier.filing_status(),
        "picks": two_tier.picks(),
        "params": params,
        "policy": policy,
    });
    let elapsed = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    let output = with_metadata(
        "Coarse/fine grid search for the upper edge of the near-maximal ROI plateau, \
         with adaptive tolerance retry",
        &assumptions,
        warnings,
        elapsed,
        result,
    );
    Ok(serde_json::to_value(output)?)
}
