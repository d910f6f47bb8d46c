//! Contract tests for the four binders.
//!
//! Every test binds a clause against the sample model and evaluates the
//! compiled expression over the sample products.

mod aggregation_contract;
mod filter_contract;
mod orderby_contract;
mod select_expand_contract;

use odex::ast::FilterClause;
use odex::types::Value;
use odex::{bind_filter, BindError, BinderContext, OdexError};

use crate::common::{ids, sample_events, sample_products};

/// Ids of the sample products matching `filter`.
pub fn matching_ids(filter: &FilterClause, ctx: &mut BinderContext) -> Vec<i32> {
    let predicate = bind_filter(Some(filter), ctx).expect("bind filter");
    let kept: Vec<Value> = sample_products()
        .into_iter()
        .filter(|p| predicate.test(p).expect("evaluate predicate"))
        .collect();
    ids(&kept)
}

/// Ids of the sample events matching `filter`.
pub fn matching_events(filter: &FilterClause, ctx: &mut BinderContext) -> Vec<i32> {
    let predicate = bind_filter(Some(filter), ctx).expect("bind filter");
    let kept: Vec<Value> = sample_events()
        .into_iter()
        .filter(|e| predicate.test(e).expect("evaluate predicate"))
        .collect();
    ids(&kept)
}

pub fn bind_error(err: &OdexError) -> &BindError {
    err.as_bind_error()
        .unwrap_or_else(|| panic!("expected a bind error, got {err}"))
}
