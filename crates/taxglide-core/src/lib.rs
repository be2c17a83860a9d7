pub mod calculator;
pub mod error;
pub mod optimize;
pub mod types;

#[cfg(feature = "schedule")]
pub mod schedule;

pub use calculator::{
    BracketContext, CachedCalculator, ContextProvider, FederalSegmentInfo, LocalBracketInfo,
    TaxAmounts, TaxCalculator,
};
pub use error::TaxGlideError;
pub use types::*;

/// Standard result type for all taxglide operations
pub type TaxGlideResult<T> = Result<T, TaxGlideError>;
