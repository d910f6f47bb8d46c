//! Whole-query compilation and in-memory execution.
//!
//! [`compile`] runs every binder a query needs against one context and
//! returns a [`CompiledQuery`] that applies the clauses in the canonical
//! order: filter, order, group/aggregate, project, paginate. When the
//! query aggregates, the ordering is bound against the group results and
//! applied after the aggregation.

mod queryable;

use tracing::debug;

use crate::ast::{
    AggregateClause, ComputeClause, FilterClause, GroupByClause, OrderByClause, SelectExpandClause,
};
use crate::binder::{
    bind_apply, bind_filter, bind_order_by, bind_select_expand, AggregationBinderResult,
    BindError, BinderContext, OrderByBinderResult, SelectExpandBinderResult,
};
use crate::error::Result;
use crate::expr::{Expr, Lambda};
use crate::types::Value;

pub use queryable::InMemoryQueryable;

/// Parsed clauses of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub compute: Option<ComputeClause>,
    pub filter: Option<FilterClause>,
    pub order_by: Option<OrderByClause>,
    pub group_by: Option<GroupByClause>,
    pub aggregate: Option<AggregateClause>,
    pub select_expand: Option<SelectExpandClause>,
    pub skip: Option<usize>,
    pub top: Option<usize>,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_compute(mut self, compute: ComputeClause) -> Self {
        self.compute = Some(compute);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: FilterClause) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, order_by: OrderByClause) -> Self {
        self.order_by = Some(order_by);
        self
    }

    #[must_use]
    pub fn with_group_by(mut self, group_by: GroupByClause) -> Self {
        self.group_by = Some(group_by);
        self
    }

    #[must_use]
    pub fn with_aggregate(mut self, aggregate: AggregateClause) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    #[must_use]
    pub fn with_select_expand(mut self, select_expand: SelectExpandClause) -> Self {
        self.select_expand = Some(select_expand);
        self
    }

    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub fn with_top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }
}

/// The compiled clauses of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub filter: Option<Lambda>,
    pub order_by: Option<OrderByBinderResult>,
    pub apply: Option<AggregationBinderResult>,
    pub select_expand: Option<SelectExpandBinderResult>,
    pub skip: Option<usize>,
    pub top: Option<usize>,
}

impl CompiledQuery {
    /// Chains every clause onto `source` (a collection expression).
    #[must_use]
    pub fn apply_to(&self, source: Expr) -> Expr {
        let mut expr = source;
        if let Some(filter) = &self.filter {
            expr = Expr::Where {
                source: Box::new(expr),
                predicate: filter.clone(),
            };
        }
        if let Some(apply) = &self.apply {
            expr = apply.apply_to(expr);
        }
        if let Some(order_by) = &self.order_by {
            expr = order_by.apply_to(expr);
        }
        if let Some(select_expand) = &self.select_expand {
            expr = select_expand.apply_to(expr);
        }
        if let Some(skip) = self.skip {
            expr = Expr::Skip {
                source: Box::new(expr),
                count: skip,
            };
        }
        if let Some(top) = self.top {
            expr = Expr::Take {
                source: Box::new(expr),
                count: top,
            };
        }
        expr
    }

    /// Runs the query over `source`.
    ///
    /// # Errors
    ///
    /// Returns the first evaluation error raised by any stage.
    pub fn execute(&self, source: InMemoryQueryable) -> Result<Vec<Value>> {
        let mut rows = source;
        if let Some(filter) = &self.filter {
            rows = rows.filter(filter)?;
        }
        if let Some(apply) = &self.apply {
            rows = rows.apply(apply)?;
        }
        if let Some(order_by) = &self.order_by {
            rows = rows.order_by(order_by)?;
        }
        if let Some(select_expand) = &self.select_expand {
            rows = rows.project(select_expand)?;
        }
        if let Some(skip) = self.skip {
            rows = rows.skip(skip);
        }
        if let Some(top) = self.top {
            rows = rows.top(top);
        }
        Ok(rows.into_vec())
    }
}

/// Compiles every clause of `options` over the context's element type.
///
/// # Errors
///
/// Returns the first binding error. A projection combined with an
/// aggregation is rejected with `UnsupportedNode`.
pub fn compile(options: &QueryOptions, ctx: &mut BinderContext) -> Result<CompiledQuery> {
    debug!(element_type = %ctx.element_type(), "Compiling query");
    if let Some(compute) = &options.compute {
        ctx.bind_compute(compute)?;
    }
    let filter = match &options.filter {
        Some(filter) => Some(bind_filter(Some(filter), ctx)?),
        None => None,
    };

    let aggregates = options.group_by.is_some() || options.aggregate.is_some();
    let apply = if aggregates {
        Some(bind_apply(options.group_by.as_ref(), options.aggregate.as_ref(), ctx)?)
    } else {
        None
    };

    let order_by = match (&options.order_by, &apply) {
        (Some(order_by), Some(apply)) => {
            let mut results = ctx.rebased(apply.result_type());
            Some(bind_order_by(Some(order_by), &mut results)?)
        }
        (Some(order_by), None) => Some(bind_order_by(Some(order_by), ctx)?),
        (None, _) => None,
    };

    let select_expand = match (&options.select_expand, &apply) {
        (Some(_), Some(_)) => {
            return Err(BindError::UnsupportedNode("select/expand over aggregated results".into()).into());
        }
        (Some(select_expand), None) => Some(bind_select_expand(Some(select_expand), ctx)?),
        (None, _) => None,
    };

    Ok(CompiledQuery {
        filter,
        order_by,
        apply,
        select_expand,
        skip: options.skip,
        top: options.top,
    })
}
