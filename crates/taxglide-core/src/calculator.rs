//! Collaborator seams consumed by the optimizer.
//!
//! The optimizer treats the tax schedule as a black box: anything that maps a
//! taxable income to the tax owed can be optimized against. Implementations
//! must be deterministic and side-effect free; the optimizer evaluates the
//! same income many times across its scan phases and compares the results
//! exactly.

use std::cell::RefCell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Deduction, Money};
use crate::TaxGlideResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Tax owed at a given taxable income.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxAmounts {
    pub total: Money,
    /// Federal share of `total`, when the calculator can break it out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federal: Option<Money>,
}

impl TaxAmounts {
    pub fn total(total: Money) -> Self {
        TaxAmounts {
            total,
            federal: None,
        }
    }

    pub fn with_federal(total: Money, federal: Money) -> Self {
        TaxAmounts {
            total,
            federal: Some(federal),
        }
    }
}

/// Federal segment containing an income.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalSegmentInfo {
    pub from: Deduction,
    pub to: Option<Deduction>,
    pub per100: Money,
    pub at_income: Deduction,
}

/// Sub-national bracket containing an income.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBracketInfo {
    pub lower: Deduction,
    pub upper: Option<Deduction>,
    pub rate_percent: Money,
}

/// Bracket position of an income, used only for narration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketContext {
    pub federal_segment: Option<FederalSegmentInfo>,
    pub local_bracket: Option<LocalBracketInfo>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Maps taxable income to total tax owed.
pub trait TaxCalculator {
    fn tax(&self, income: Money) -> TaxGlideResult<TaxAmounts>;
}

/// Describes which brackets an income falls into.
pub trait ContextProvider {
    fn context(&self, income: Money) -> TaxGlideResult<BracketContext>;
}

impl<F> TaxCalculator for F
where
    F: Fn(Money) -> TaxGlideResult<TaxAmounts>,
{
    fn tax(&self, income: Money) -> TaxGlideResult<TaxAmounts> {
        self(income)
    }
}

impl<F> ContextProvider for F
where
    F: Fn(Money) -> TaxGlideResult<BracketContext>,
{
    fn context(&self, income: Money) -> TaxGlideResult<BracketContext> {
        self(income)
    }
}

// ---------------------------------------------------------------------------
// Memoization
// ---------------------------------------------------------------------------

/// Memoizes a calculator on income.
///
/// The optimizer never caches on its own; callers with an expensive
/// calculator wrap it here before handing it over. Not `Sync`: one cache per
/// invocation.
pub struct CachedCalculator<C> {
    inner: C,
    cache: RefCell<HashMap<Money, TaxAmounts>>,
}

impl<C> CachedCalculator<C> {
    pub fn new(inner: C) -> Self {
        CachedCalculator {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Number of distinct incomes evaluated so far.
    pub fn cached_incomes(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl<C: TaxCalculator> TaxCalculator for CachedCalculator<C> {
    fn tax(&self, income: Money) -> TaxGlideResult<TaxAmounts> {
        if let Some(hit) = self.cache.borrow().get(&income).copied() {
            return Ok(hit);
        }
        let amounts = self.inner.tax(income)?;
        self.cache.borrow_mut().insert(income, amounts);
        Ok(amounts)
    }
}

impl<C: ContextProvider> ContextProvider for CachedCalculator<C> {
    fn context(&self, income: Money) -> TaxGlideResult<BracketContext> {
        self.inner.context(income)
    }
}
