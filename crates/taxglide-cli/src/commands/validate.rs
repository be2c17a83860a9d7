use clap::Args;
use serde_json::{json, Value};

use super::load_schedule;

/// Arguments for schedule validation
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to a JSON or YAML schedule file (schedule JSON on stdin otherwise)
    #[arg(long)]
    pub schedule: Option<String>,
}

pub fn run_validate(args: ValidateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = load_schedule(args.schedule.as_deref())?;
    config.validate()?;

    let codes: Vec<&str> = config.multipliers.iter().map(|m| m.code.as_str()).collect();
    Ok(json!({
        "valid": true,
        "currency": config.currency,
        "federal_segments_single": config.federal.single.segments.len(),
        "federal_segments_married_joint": config.federal.married_joint.segments.len(),
        "local_brackets": config.local.brackets.len(),
        "flat_override": config.local.flat_override.is_some(),
        "multipliers": codes,
        "default_picks": config.default_picks(),
    }))
}
