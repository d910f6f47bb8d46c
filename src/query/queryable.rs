//! In-memory execution of compiled clauses.

use rayon::prelude::*;
use tracing::trace;

use crate::binder::{AggregationBinderResult, OrderByBinderResult, SelectExpandBinderResult};
use crate::error::{OdexError, Result};
use crate::expr::{Expr, Lambda};
use crate::settings::DEFAULT_PARALLEL_THRESHOLD;
use crate::types::{TypeRef, Value};

/// A materialized sequence that compiled clauses can be applied to.
///
/// Every stage consumes the queryable and returns the transformed one, so
/// stages chain in the order the caller applies them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryQueryable {
    items: Vec<Value>,
    parallel_threshold: usize,
}

impl InMemoryQueryable {
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        InMemoryQueryable {
            items,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    /// Filters in parallel once the sequence holds at least `threshold`
    /// items.
    #[must_use]
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Keeps the items for which `predicate` is true. Input order is kept.
    ///
    /// # Errors
    ///
    /// Returns the first evaluation error in input order.
    pub fn filter(self, predicate: &Lambda) -> Result<Self> {
        let parallel = self.items.len() >= self.parallel_threshold;
        trace!(items = self.items.len(), parallel, "Filtering");
        let verdicts: Vec<Result<bool>> = if parallel {
            self.items.par_iter().map(|item| predicate.test(item)).collect()
        } else {
            self.items.iter().map(|item| predicate.test(item)).collect()
        };
        let mut kept = Vec::with_capacity(self.items.len());
        for (item, verdict) in self.items.into_iter().zip(verdicts) {
            if verdict? {
                kept.push(item);
            }
        }
        Ok(InMemoryQueryable {
            items: kept,
            parallel_threshold: self.parallel_threshold,
        })
    }

    /// Stable sort by every key of the chain.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error raised by a key selector.
    pub fn order_by(self, order_by: &OrderByBinderResult) -> Result<Self> {
        let threshold = self.parallel_threshold;
        let ordered = order_by.apply_to(self.into_constant()).evaluate()?;
        Self::from_collection(ordered, threshold)
    }

    /// Replaces the items by their group results.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error raised by a key or aggregate.
    pub fn apply(self, apply: &AggregationBinderResult) -> Result<Self> {
        let threshold = self.parallel_threshold;
        let groups = apply.expression.invoke(&Value::collection(self.items))?;
        Self::from_collection(groups, threshold)
    }

    /// Maps every item through the projector.
    ///
    /// # Errors
    ///
    /// Returns the first evaluation error.
    pub fn project(self, select_expand: &SelectExpandBinderResult) -> Result<Self> {
        let items = self
            .items
            .iter()
            .map(|item| select_expand.projector.invoke(item))
            .collect::<Result<Vec<_>>>()?;
        Ok(InMemoryQueryable {
            items,
            parallel_threshold: self.parallel_threshold,
        })
    }

    #[must_use]
    pub fn skip(mut self, count: usize) -> Self {
        self.items.drain(..count.min(self.items.len()));
        self
    }

    #[must_use]
    pub fn top(mut self, count: usize) -> Self {
        self.items.truncate(count);
        self
    }

    #[must_use]
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Value> {
        self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn into_constant(self) -> Expr {
        Expr::constant(
            Value::collection(self.items),
            TypeRef::collection(TypeRef::untyped()),
        )
    }

    fn from_collection(value: Value, parallel_threshold: usize) -> Result<Self> {
        match value {
            Value::Collection(items) => Ok(InMemoryQueryable {
                items: items.to_vec(),
                parallel_threshold,
            }),
            other => Err(OdexError::InvalidExpression(format!(
                "expected a collection, found {}",
                other.type_name()
            ))),
        }
    }
}

impl From<Vec<Value>> for InMemoryQueryable {
    fn from(items: Vec<Value>) -> Self {
        Self::new(items)
    }
}

impl FromIterator<Value> for InMemoryQueryable {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
