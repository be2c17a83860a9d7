use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaxGlideError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Tax calculator failed at income {income}: {reason}")]
    CalculatorFailure { income: Decimal, reason: String },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl TaxGlideError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        TaxGlideError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures raised by a TaxCalculator or ContextProvider.
    pub fn is_calculator_failure(&self) -> bool {
        matches!(self, TaxGlideError::CalculatorFailure { .. })
    }
}

impl From<serde_json::Error> for TaxGlideError {
    fn from(e: serde_json::Error) -> Self {
        TaxGlideError::SerializationError(e.to_string())
    }
}
