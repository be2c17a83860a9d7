pub mod engine;
pub mod model;
pub mod params;
pub mod retry;
pub mod validation;

#[cfg(feature = "scan")]
pub mod scan;

pub use engine::{evaluate_deduction, optimize_deduction, OptimizeInput};
pub use model::*;
pub use params::{AdaptiveTolerance, OptimizerParams, RetryPolicy, ToleranceBand};
pub use retry::{alternate_tolerances, optimize_deduction_adaptive};
