//! Aggregation binder.
//!
//! `groupby` keys become a nested key bag per element; the source is
//! partitioned on key equality and every partition is folded into a group
//! result pairing its key bag with a bag of aggregate values.

use std::sync::Arc;

use tracing::debug;

use crate::ast::{AggregateClause, AggregateExpression, AggregationMethod, GroupByClause, GroupByPropertyNode};
use crate::error::Result;
use crate::expr::{AggregateMethod, Expr, Lambda};
use crate::model::Member;
use crate::types::{BagShape, PrimitiveKind, SlotKind, SlotShape, TypeKind, TypeRef};

use super::context::BinderContext;
use super::filter::{bind_expression, bind_filter};
use super::BindError;

/// Compiled `groupby`/`aggregate` pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationBinderResult {
    /// Maps the source collection to the collection of group results.
    pub expression: Lambda,
    /// Key slots followed by aggregate slots.
    pub result_shape: Arc<BagShape>,
    pub key_shape: Arc<BagShape>,
    pub aggregate_shape: Arc<BagShape>,
}

impl AggregationBinderResult {
    /// Applies the pipeline to `source` (a collection).
    #[must_use]
    pub fn apply_to(&self, source: Expr) -> Expr {
        self.expression.apply(source)
    }

    /// Static type of one group result, for binding clauses that run after
    /// the aggregation.
    #[must_use]
    pub fn result_type(&self) -> TypeRef {
        TypeRef::record(Arc::clone(&self.result_shape))
    }
}

/// Compiles grouping keys and aggregate applications.
///
/// With no grouping properties every element falls in one group; with no
/// aggregate clause the aggregate bag is empty.
///
/// # Errors
///
/// Returns `ArgumentNull` when both clauses are absent, `PropertyNotFound`
/// for an unknown navigation, `IncompatibleOperandTypes` when a method
/// does not apply to the aggregated type, or any error raised while binding
/// a key, selector or nested filter.
pub fn bind_apply(
    group_by: Option<&GroupByClause>,
    aggregate: Option<&AggregateClause>,
    ctx: &mut BinderContext,
) -> Result<AggregationBinderResult> {
    if group_by.is_none() && aggregate.is_none() {
        return Err(BindError::ArgumentNull("apply".into()).into());
    }
    let element_type = ctx.element_type().clone();
    debug!(
        element_type = %element_type,
        keys = group_by.map_or(0, |g| g.properties.len()),
        aggregates = aggregate.map_or(0, |a| a.expressions.len()),
        "Binding apply"
    );

    let properties = group_by.map(|g| g.properties.as_slice()).unwrap_or_default();
    let (key_bag, key_shape) = bind_key_level(properties, ctx)?;

    let collection = ctx.next_param();
    let group = ctx.next_param();
    let elements = Expr::GroupElements(Box::new(Expr::parameter(group, TypeRef::untyped())));

    let expressions = aggregate.map(|a| a.expressions.as_slice()).unwrap_or_default();
    let (aggregate_bag, aggregate_shape) = bind_aggregates(expressions, &elements, ctx)?;

    let result_shape = Arc::new(BagShape {
        slots: key_shape
            .slots
            .iter()
            .chain(&aggregate_shape.slots)
            .cloned()
            .collect(),
        instance_type: None,
    });
    let group_result = Expr::MakeGroupResult {
        key: Box::new(Expr::GroupKey(Box::new(Expr::parameter(group, TypeRef::untyped())))),
        aggregates: Box::new(aggregate_bag),
        shape: Arc::clone(&result_shape),
    };

    let collection_type = TypeRef::collection(element_type.clone());
    let body = Expr::Select {
        source: Box::new(Expr::GroupBy {
            source: Box::new(Expr::parameter(collection, collection_type.clone())),
            key: Lambda::new(ctx.source_param(), element_type, key_bag),
        }),
        selector: Lambda::new(group, TypeRef::untyped(), group_result),
    };

    Ok(AggregationBinderResult {
        expression: Lambda::new(collection, collection_type, body),
        result_shape,
        key_shape,
        aggregate_shape,
    })
}

/// Key bag of one navigation level: leaves bind their full path from the
/// element, inner nodes become nested bags.
fn bind_key_level(
    properties: &[GroupByPropertyNode],
    ctx: &mut BinderContext,
) -> Result<(Expr, Arc<BagShape>)> {
    let mut slots = Vec::with_capacity(properties.len());
    let mut values = Vec::with_capacity(properties.len());
    for property in properties {
        let value = match &property.expression {
            Some(expression) if property.children.is_empty() => bind_expression(expression, ctx)?,
            None if !property.children.is_empty() => bind_key_level(&property.children, ctx)?.0,
            _ => {
                return Err(BindError::UnsupportedNode(format!(
                    "groupby property '{}' must be a path or a level",
                    property.name
                ))
                .into());
            }
        };
        slots.push(SlotShape::new(property.name.clone(), value.type_ref(), SlotKind::GroupKey));
        values.push(value);
    }
    Ok(make_bag(slots, values))
}

fn bind_aggregates(
    expressions: &[AggregateExpression],
    elements: &Expr,
    ctx: &mut BinderContext,
) -> Result<(Expr, Arc<BagShape>)> {
    let mut slots = Vec::with_capacity(expressions.len());
    let mut values = Vec::with_capacity(expressions.len());
    for expression in expressions {
        let value = match expression {
            AggregateExpression::Property {
                expression, method, ..
            } => {
                let selector = bind_expression(expression, ctx)?;
                bind_method(*method, selector, elements, ctx)?
            }
            AggregateExpression::Count { .. } => Expr::Aggregate {
                source: Box::new(elements.clone()),
                method: AggregateMethod::Count,
                selector: None,
                type_ref: TypeRef::int64(),
            },
            AggregateExpression::Collection {
                navigation,
                filter,
                children,
                ..
            } => {
                let (related, mut nested) = flatten_navigation(navigation, elements, ctx)?;
                let related = match filter {
                    Some(filter) => Expr::Where {
                        source: Box::new(related),
                        predicate: bind_filter(Some(filter), &mut nested)?,
                    },
                    None => related,
                };
                bind_aggregates(children, &related, &mut nested)?.0
            }
        };
        debug!(alias = expression.alias(), type_ref = %value.type_ref(), "Bound aggregate");
        slots.push(SlotShape::new(expression.alias(), value.type_ref(), SlotKind::Aggregate));
        values.push(value);
    }
    Ok(make_bag(slots, values))
}

/// Related records of every element, with a context scoped to them.
fn flatten_navigation(
    navigation: &str,
    elements: &Expr,
    ctx: &BinderContext,
) -> Result<(Expr, BinderContext)> {
    let element_type = ctx.element_type().clone();
    let type_name = element_type.structured_name().unwrap_or_default();
    let target = match ctx.model().find_member(type_name, navigation) {
        Some(Member::Navigation(nav)) if nav.is_collection => nav.target_type.clone(),
        Some(_) => {
            return Err(BindError::UnsupportedNode(format!(
                "'{navigation}' is not a collection navigation property"
            ))
            .into());
        }
        None => {
            return Err(BindError::PropertyNotFound {
                type_name: type_name.to_string(),
                property: navigation.to_string(),
            }
            .into());
        }
    };
    let related = ctx.bind_property_access(ctx.source_expr(), navigation)?;
    let flattened = Expr::SelectMany {
        source: Box::new(elements.clone()),
        selector: Lambda::new(ctx.source_param(), element_type, related),
    };
    Ok((flattened, ctx.rebased(TypeRef::entity(target))))
}

fn bind_method(
    method: AggregationMethod,
    selector: Expr,
    elements: &Expr,
    ctx: &BinderContext,
) -> Result<Expr> {
    let selector_type = selector.type_ref();
    let (method, selector, type_ref) = match method {
        AggregationMethod::Sum | AggregationMethod::Average if selector_type.is_untyped() => {
            let decimal = TypeRef::primitive(PrimitiveKind::Decimal, true);
            let converted = Expr::TryConvert {
                operand: Box::new(selector),
                target: decimal.clone(),
                members: None,
            };
            let method = if method == AggregationMethod::Sum {
                AggregateMethod::Sum
            } else {
                AggregateMethod::Average
            };
            (method, converted, decimal.with_nullable(method == AggregateMethod::Average))
        }
        AggregationMethod::Sum => {
            let kind = sum_kind(&selector_type)?;
            (AggregateMethod::Sum, selector, TypeRef::primitive(kind, false))
        }
        AggregationMethod::Average => {
            let kind = match sum_kind(&selector_type)? {
                PrimitiveKind::Decimal => PrimitiveKind::Decimal,
                _ => PrimitiveKind::Double,
            };
            (AggregateMethod::Average, selector, TypeRef::primitive(kind, true))
        }
        AggregationMethod::Min | AggregationMethod::Max => {
            if !is_orderable(&selector_type) {
                return Err(BindError::IncompatibleOperandTypes(format!(
                    "cannot compute min/max of {selector_type}"
                ))
                .into());
            }
            let method = if method == AggregationMethod::Min {
                AggregateMethod::Min
            } else {
                AggregateMethod::Max
            };
            (method, selector, selector_type.as_nullable())
        }
        AggregationMethod::CountDistinct => (AggregateMethod::CountDistinct, selector, TypeRef::int64()),
    };
    Ok(Expr::Aggregate {
        source: Box::new(elements.clone()),
        method,
        selector: Some(Lambda::new(ctx.source_param(), ctx.element_type().clone(), selector)),
        type_ref,
    })
}

/// Accumulator kind for summing values of `type_ref`.
fn sum_kind(type_ref: &TypeRef) -> Result<PrimitiveKind> {
    match type_ref.primitive_kind() {
        Some(kind) if kind.is_integral() => Ok(PrimitiveKind::Int64),
        Some(kind) if kind.is_floating() => Ok(PrimitiveKind::Double),
        Some(PrimitiveKind::Decimal) => Ok(PrimitiveKind::Decimal),
        _ => Err(BindError::IncompatibleOperandTypes(format!("cannot aggregate values of type {type_ref}")).into()),
    }
}

fn is_orderable(type_ref: &TypeRef) -> bool {
    match &type_ref.kind {
        TypeKind::Primitive(kind) => *kind != PrimitiveKind::Binary,
        TypeKind::Enum(_) | TypeKind::Untyped => true,
        _ => false,
    }
}

fn make_bag(slots: Vec<SlotShape>, values: Vec<Expr>) -> (Expr, Arc<BagShape>) {
    let shape = Arc::new(BagShape {
        slots,
        instance_type: None,
    });
    let bag = Expr::MakeBag {
        shape: Arc::clone(&shape),
        instance: None,
        slots: values,
    };
    (bag, shape)
}
