//! OrderBy binder.

use tracing::debug;

use crate::ast::{OrderByClause, OrderByDirection, IMPLICIT_RANGE_VARIABLE};
use crate::error::Result;
use crate::expr::{Expr, Lambda, SortKey};
use crate::types::TypeKind;

use super::context::BinderContext;
use super::filter::bind_expression;
use super::BindError;

/// One compiled ordering key, linked to the next key of the same clause.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByBinderResult {
    /// Key selector over the source element.
    pub key_selector: Lambda,
    pub direction: OrderByDirection,
    pub then_by: Option<Box<OrderByBinderResult>>,
}

impl OrderByBinderResult {
    /// Flattens the chain into sort keys, most significant first.
    #[must_use]
    pub fn sort_keys(&self) -> Vec<SortKey> {
        let mut keys = Vec::new();
        let mut link = Some(self);
        while let Some(current) = link {
            keys.push(SortKey {
                selector: current.key_selector.clone(),
                descending: current.direction == OrderByDirection::Descending,
            });
            link = current.then_by.as_deref();
        }
        keys
    }

    /// Wraps `source` (a collection) in a stable ordering by every key.
    #[must_use]
    pub fn apply_to(&self, source: Expr) -> Expr {
        Expr::OrderBy {
            source: Box::new(source),
            keys: self.sort_keys(),
        }
    }

    /// Number of keys in the chain.
    #[must_use]
    pub fn key_count(&self) -> usize {
        1 + self.then_by.as_ref().map_or(0, |next| next.key_count())
    }
}

/// Compiles an orderby clause and its then-by chain.
///
/// Keys may name properties, computed properties, `$it` for primitive
/// collections, and result names when the context's element type is an
/// aggregation result.
///
/// # Errors
///
/// Returns `ArgumentNull` when the clause is absent, or a binding error
/// for the first key that cannot be compiled or ordered.
pub fn bind_order_by(
    order_by: Option<&OrderByClause>,
    ctx: &mut BinderContext,
) -> Result<OrderByBinderResult> {
    let order_by = order_by.ok_or_else(|| BindError::ArgumentNull("orderby".into()))?;
    debug!(element_type = %ctx.element_type(), "Binding orderby");
    bind_link(order_by, ctx)
}

fn bind_link(clause: &OrderByClause, ctx: &mut BinderContext) -> Result<OrderByBinderResult> {
    let param = ctx.source_param();
    let element_type = ctx.element_type().clone();
    let key = if clause.range_variable == IMPLICIT_RANGE_VARIABLE
        || ctx.scope().contains(&clause.range_variable)
    {
        bind_expression(&clause.expression, ctx)?
    } else {
        let mut scope = ctx.enter_range_as(&clause.range_variable, param, element_type.clone())?;
        bind_expression(&clause.expression, &mut scope)?
    };

    let key_type = key.type_ref();
    if matches!(
        key_type.kind,
        TypeKind::Collection(_) | TypeKind::Entity(_) | TypeKind::Complex(_) | TypeKind::Record(_)
    ) {
        return Err(BindError::IncompatibleOperandTypes(format!(
            "cannot order by a value of type {key_type}"
        ))
        .into());
    }

    let then_by = match &clause.then_by {
        Some(next) => Some(Box::new(bind_link(next, ctx)?)),
        None => None,
    };
    Ok(OrderByBinderResult {
        key_selector: Lambda::new(param, element_type, key),
        direction: clause.direction,
        then_by,
    })
}
