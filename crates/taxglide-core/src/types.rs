use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Whole currency units deducted from taxable income.
pub type Deduction = u64;

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    CHF,
    EUR,
    USD,
    GBP,
    Other(String),
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
    pub generated_at: DateTime<Utc>,
}

/// Wrap a computation result with metadata. Kept out of the optimizer itself
/// so that its results stay bit-identical across runs.
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
            generated_at: Utc::now(),
        },
    }
}

/// Express a ratio as a percentage rounded for presentation.
pub fn to_percent(ratio: Rate) -> Decimal {
    (ratio * Decimal::ONE_HUNDRED).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_percent_rounds_two_places() {
        assert_eq!(to_percent(dec!(0.123456)), dec!(12.35));
        assert_eq!(to_percent(dec!(0.25)), dec!(25));
    }

    #[test]
    fn test_metadata_populated() {
        let out = with_metadata("m", &serde_json::json!({"a": 1}), vec![], 7, dec!(1));
        assert_eq!(out.metadata.precision, "rust_decimal_128bit");
        assert_eq!(out.metadata.computation_time_us, 7);
        assert!(!out.metadata.version.is_empty());
    }
}
