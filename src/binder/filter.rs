//! Filter binder.
//!
//! [`bind_expression`] lowers any query node to an [`Expr`]; the other
//! binders reuse it for key selectors, computed properties, nested filters
//! and aggregate operands. [`bind_filter`] wraps the result into a
//! predicate over the context's source element.

use tracing::debug;

use crate::ast::{
    BinaryOperatorKind, FilterClause, QueryNode, UnaryOperatorKind, IMPLICIT_RANGE_VARIABLE,
    THIS_RANGE_VARIABLE,
};
use crate::error::Result;
use crate::expr::{BinaryOp, Expr, Lambda};
use crate::types::convert::{convert, EnumMembers};
use crate::types::{PrimitiveKind, TypeRef, Value};

use super::base::promote;
use super::context::BinderContext;
use super::BindError;

/// Compiles a filter clause into a predicate over the source element.
///
/// The predicate is true only where the expression evaluates to `true`;
/// null results are treated as false.
///
/// # Errors
///
/// Returns `ArgumentNull` when the clause is absent, or the first binding
/// error found in the expression.
pub fn bind_filter(filter: Option<&FilterClause>, ctx: &mut BinderContext) -> Result<Lambda> {
    let filter = filter.ok_or_else(|| BindError::ArgumentNull("filter".into()))?;
    debug!(element_type = %ctx.element_type(), "Binding filter");

    let param = ctx.source_param();
    let element_type = ctx.element_type().clone();
    let body = if ctx.scope().contains(&filter.range_variable) {
        bind_expression(&filter.expression, ctx)?
    } else {
        let mut scope = ctx.enter_range_as(&filter.range_variable, param, element_type.clone())?;
        bind_expression(&filter.expression, &mut scope)?
    };
    Ok(Lambda::new(param, element_type, predicate(body)?))
}

/// Compiles one query node in the given context.
///
/// # Errors
///
/// Returns a [`BindError`] (wrapped) describing the first node that
/// cannot be compiled.
pub fn bind_expression(node: &QueryNode, ctx: &mut BinderContext) -> Result<Expr> {
    match node {
        QueryNode::Constant { value, type_ref } => Ok(bind_literal(value, type_ref.as_ref(), ctx)),
        QueryNode::CollectionConstant { items, item_type } => {
            Ok(ctx.bind_collection_constant(items, item_type))
        }
        QueryNode::BinaryOperator { op, left, right } => bind_binary(*op, left, right, ctx),
        QueryNode::UnaryOperator { op, operand } => bind_unary(*op, operand, ctx),
        QueryNode::Convert { source, target } => {
            let source = bind_expression(source, ctx)?;
            Ok(ctx.convert_to(source, target))
        }
        QueryNode::RangeVariable { name } => ctx.resolve_range(name),
        QueryNode::Property { source, name } => {
            let source = bind_expression(source, ctx)?;
            if let Some(computed) = computed_property(&source, name, ctx) {
                return Ok(computed);
            }
            ctx.bind_property_access(source, name)
        }
        QueryNode::DynamicProperty { source, name } => {
            let source = bind_expression(source, ctx)?;
            if let Some(computed) = computed_property(&source, name, ctx) {
                return Ok(computed);
            }
            ctx.bind_dynamic_property(source, name)
        }
        QueryNode::ResourceCast { source, type_name } => {
            let source = bind_expression(source, ctx)?;
            ctx.bind_resource_cast(source, type_name)
        }
        QueryNode::Any {
            source,
            variable,
            body,
        } => bind_any(source, variable, body.as_deref(), ctx),
        QueryNode::All {
            source,
            variable,
            body,
        } => bind_all(source, variable, body, ctx),
        QueryNode::FunctionCall { name, args } => bind_call(name, args, ctx),
        QueryNode::Cast { source, type_name } => {
            let source = match source {
                Some(source) => bind_expression(source, ctx)?,
                None => ctx.innermost_range(),
            };
            ctx.bind_cast(source, type_name)
        }
        QueryNode::IsOf { source, type_name } => {
            let source = match source {
                Some(source) => bind_expression(source, ctx)?,
                None => ctx.innermost_range(),
            };
            ctx.bind_is_of(source, type_name)
        }
        QueryNode::Count { source, filter } => bind_count(source, filter.as_deref(), ctx),
        QueryNode::In { item, list } => bind_in(item, list, ctx),
        QueryNode::ParameterAlias { alias, value } => match value {
            Some(value) => bind_expression(value, ctx),
            None => {
                debug!(alias = %alias, "Unresolved parameter alias binds to null");
                Ok(Expr::null(&TypeRef::untyped()))
            }
        },
    }
}

/// Checks that `body` is boolean and coalesces a nullable result to false.
pub(crate) fn predicate(body: Expr) -> Result<Expr> {
    let type_ref = body.type_ref();
    if !type_ref.is_boolean() && !type_ref.is_untyped() {
        return Err(BindError::IncompatibleOperandTypes(format!(
            "expected a boolean predicate, found {type_ref}"
        ))
        .into());
    }
    Ok(if type_ref.nullable {
        Expr::IsTrue(Box::new(body))
    } else {
        body
    })
}

fn bind_literal(value: &Value, type_ref: Option<&TypeRef>, ctx: &BinderContext) -> Expr {
    let Some(type_ref) = type_ref else {
        return match value {
            Value::Null => Expr::null(&TypeRef::untyped()),
            other => ctx.bind_constant(other.clone(), other.infer_type()),
        };
    };
    let value = if value.is_null() || value.infer_type().kind == type_ref.kind {
        value.clone()
    } else {
        let members = ctx.enum_members(type_ref);
        convert(value, &type_ref.kind, members.as_deref().map(|m| m as &dyn EnumMembers))
            .unwrap_or_else(|| value.clone())
    };
    ctx.bind_constant(value, type_ref.clone())
}

/// `$it/alias` for an alias defined by `$compute`.
fn computed_property(source: &Expr, name: &str, ctx: &BinderContext) -> Option<Expr> {
    match source {
        Expr::Parameter { id, .. } if *id == ctx.source_param() => ctx.computed(name).cloned(),
        _ => None,
    }
}

fn bind_binary(
    op: BinaryOperatorKind,
    left: &QueryNode,
    right: &QueryNode,
    ctx: &mut BinderContext,
) -> Result<Expr> {
    let left = bind_expression(left, ctx)?;
    let right = bind_expression(right, ctx)?;
    let op = match op {
        BinaryOperatorKind::And => {
            return Ok(Expr::and_also(logical(left, "and")?, logical(right, "and")?));
        }
        BinaryOperatorKind::Or => {
            return Ok(Expr::or_else(logical(left, "or")?, logical(right, "or")?));
        }
        BinaryOperatorKind::Has => return bind_has(left, right, ctx),
        BinaryOperatorKind::Equal => BinaryOp::Equal,
        BinaryOperatorKind::NotEqual => BinaryOp::NotEqual,
        BinaryOperatorKind::GreaterThan => BinaryOp::GreaterThan,
        BinaryOperatorKind::GreaterThanOrEqual => BinaryOp::GreaterThanOrEqual,
        BinaryOperatorKind::LessThan => BinaryOp::LessThan,
        BinaryOperatorKind::LessThanOrEqual => BinaryOp::LessThanOrEqual,
        BinaryOperatorKind::Add => BinaryOp::Add,
        BinaryOperatorKind::Subtract => BinaryOp::Subtract,
        BinaryOperatorKind::Multiply => BinaryOp::Multiply,
        BinaryOperatorKind::Divide => BinaryOp::Divide,
        BinaryOperatorKind::Modulo => BinaryOp::Modulo,
    };
    let (left, right) = align_literals(left, right, ctx)?;
    if op.is_comparison() {
        bind_comparison(op, left, right, ctx)
    } else {
        bind_arithmetic(op, left, right, ctx)
    }
}

fn logical(operand: Expr, keyword: &str) -> Result<Expr> {
    let type_ref = operand.type_ref();
    if type_ref.is_boolean() || type_ref.is_untyped() {
        Ok(operand)
    } else {
        Err(BindError::IncompatibleOperandTypes(format!(
            "'{keyword}' requires boolean operands, found {type_ref}"
        ))
        .into())
    }
}

/// Types a null literal after the other operand, and parses a string
/// literal compared with an enum operand into the enum member.
fn align_literals(left: Expr, right: Expr, ctx: &BinderContext) -> Result<(Expr, Expr)> {
    let (left_null, right_null) = (left.is_null_constant(), right.is_null_constant());
    if right_null && !left_null {
        let right = Expr::null(&left.type_ref());
        return Ok((left, right));
    }
    if left_null && !right_null {
        let left = Expr::null(&right.type_ref());
        return Ok((left, right));
    }
    let (left_type, right_type) = (left.type_ref(), right.type_ref());
    if left_type.enum_name().is_some() && right_type.is_string() {
        let right = enum_literal(&right, &left_type, ctx)?;
        return Ok((left, right));
    }
    if right_type.enum_name().is_some() && left_type.is_string() {
        let left = enum_literal(&left, &right_type, ctx)?;
        return Ok((left, right));
    }
    Ok((left, right))
}

fn enum_literal(literal: &Expr, enum_type: &TypeRef, ctx: &BinderContext) -> Result<Expr> {
    let incompatible = || {
        BindError::IncompatibleOperandTypes(format!("{} and {enum_type}", literal.type_ref()))
    };
    let value = literal.constant_value().ok_or_else(incompatible)?;
    let members = ctx.enum_members(enum_type);
    let parsed = convert(value, &enum_type.kind, members.as_deref().map(|m| m as &dyn EnumMembers))
        .ok_or_else(incompatible)?;
    Ok(ctx.bind_constant(parsed, enum_type.with_nullable(false)))
}

fn bind_comparison(op: BinaryOp, left: Expr, right: Expr, ctx: &BinderContext) -> Result<Expr> {
    let (left_type, right_type) = (left.type_ref(), right.type_ref());
    let structural = |t: &TypeRef| {
        t.structured_name().is_some() || t.is_collection() || t.record_shape().is_some()
    };
    if structural(&left_type) || structural(&right_type) {
        let equality = matches!(op, BinaryOp::Equal | BinaryOp::NotEqual);
        if equality && left_type.kind == right_type.kind {
            return Ok(Expr::binary(op, left, right, TypeRef::boolean()));
        }
        return Err(BindError::IncompatibleOperandTypes(format!(
            "cannot compare {left_type} {} {right_type}",
            op.as_str()
        ))
        .into());
    }
    let target = promote(&left_type, &right_type)?;
    let left = ctx.convert_to(left, &target);
    let right = ctx.convert_to(right, &target);
    Ok(Expr::binary(op, left, right, TypeRef::boolean()))
}

fn bind_arithmetic(op: BinaryOp, left: Expr, right: Expr, ctx: &BinderContext) -> Result<Expr> {
    use PrimitiveKind as P;

    let (left_type, right_type) = (left.type_ref(), right.type_ref());
    let nullable = left_type.nullable || right_type.nullable;
    let additive = matches!(op, BinaryOp::Add | BinaryOp::Subtract);
    let temporal = match (left_type.primitive_kind(), right_type.primitive_kind()) {
        (Some(P::DateTimeOffset), Some(P::Duration)) if additive => Some(P::DateTimeOffset),
        (Some(P::Date), Some(P::Duration)) if additive => Some(P::Date),
        (Some(P::Duration), Some(P::Duration)) if additive => Some(P::Duration),
        (Some(P::DateTimeOffset), Some(P::DateTimeOffset)) | (Some(P::Date), Some(P::Date))
            if op == BinaryOp::Subtract =>
        {
            Some(P::Duration)
        }
        _ => None,
    };
    if let Some(kind) = temporal {
        return Ok(Expr::binary(op, left, right, TypeRef::primitive(kind, nullable)));
    }

    let target = promote(&left_type, &right_type)?;
    if !target.is_numeric() && !target.is_untyped() {
        return Err(BindError::IncompatibleOperandTypes(format!(
            "'{}' is not defined for {left_type} and {right_type}",
            op.as_str()
        ))
        .into());
    }
    let left = ctx.convert_to(left, &target);
    let right = ctx.convert_to(right, &target);
    Ok(Expr::binary(op, left, right, target))
}

fn bind_has(left: Expr, right: Expr, ctx: &BinderContext) -> Result<Expr> {
    let left_type = left.type_ref();
    if left_type.enum_name().is_none() && !left_type.is_untyped() {
        return Err(BindError::IncompatibleOperandTypes(format!(
            "'has' requires an enum operand, found {left_type}"
        ))
        .into());
    }
    let right = if right.type_ref().is_string() && !left_type.is_untyped() {
        enum_literal(&right, &left_type, ctx)?
    } else {
        right
    };
    let type_ref = TypeRef::boolean().with_nullable(left_type.nullable);
    Ok(Expr::binary(BinaryOp::Has, left, right, type_ref))
}

fn bind_unary(op: UnaryOperatorKind, operand: &QueryNode, ctx: &mut BinderContext) -> Result<Expr> {
    let operand = bind_expression(operand, ctx)?;
    let type_ref = operand.type_ref();
    match op {
        UnaryOperatorKind::Not => Ok(Expr::Not(Box::new(logical(operand, "not")?))),
        UnaryOperatorKind::Negate => {
            let negatable = type_ref.is_numeric()
                || type_ref.is_untyped()
                || type_ref.primitive_kind() == Some(PrimitiveKind::Duration);
            if !negatable {
                return Err(BindError::IncompatibleOperandTypes(format!(
                    "cannot negate {type_ref}"
                ))
                .into());
            }
            Ok(Expr::Negate(Box::new(operand)))
        }
    }
}

fn collection_element(source: &Expr, operation: &str) -> Result<TypeRef> {
    let type_ref = source.type_ref();
    match type_ref.element_type() {
        Some(element) => Ok(element.clone()),
        None if type_ref.is_untyped() => Ok(TypeRef::untyped()),
        None => Err(BindError::IncompatibleOperandTypes(format!(
            "{operation} requires a collection, found {type_ref}"
        ))
        .into()),
    }
}

/// Binds `variable: body` as a predicate lambda over `element`.
fn bind_lambda(
    variable: &str,
    element: TypeRef,
    body: &QueryNode,
    ctx: &mut BinderContext,
) -> Result<Lambda> {
    let mut scope = ctx.enter_range(variable, element.clone())?;
    let param = scope.param();
    let body = predicate(bind_expression(body, &mut scope)?)?;
    Ok(Lambda::new(param, element, body))
}

fn bind_any(
    source: &QueryNode,
    variable: &str,
    body: Option<&QueryNode>,
    ctx: &mut BinderContext,
) -> Result<Expr> {
    let source = bind_expression(source, ctx)?;
    let element = collection_element(&source, "any")?;
    let predicate = match body {
        Some(body) => {
            let lambda = bind_lambda(variable, element, body, ctx)?;
            // any(x: true) is the plain non-empty test
            if matches!(lambda.body.constant_value(), Some(Value::Boolean(true))) {
                None
            } else {
                Some(lambda)
            }
        }
        None => None,
    };
    let any = Expr::Any {
        source: Box::new(source.clone()),
        predicate,
    };
    Ok(ctx.apply_null_propagation(&source, any))
}

fn bind_all(
    source: &QueryNode,
    variable: &str,
    body: &QueryNode,
    ctx: &mut BinderContext,
) -> Result<Expr> {
    let source = bind_expression(source, ctx)?;
    let element = collection_element(&source, "all")?;
    let predicate = bind_lambda(variable, element, body, ctx)?;
    let all = Expr::All {
        source: Box::new(source.clone()),
        predicate,
    };
    Ok(ctx.apply_null_propagation(&source, all))
}

fn bind_count(
    source: &QueryNode,
    filter: Option<&FilterClause>,
    ctx: &mut BinderContext,
) -> Result<Expr> {
    let source = bind_expression(source, ctx)?;
    let element = collection_element(&source, "$count")?;
    let counted = match filter {
        Some(filter) => {
            let variable = if filter.range_variable == IMPLICIT_RANGE_VARIABLE {
                THIS_RANGE_VARIABLE
            } else {
                filter.range_variable.as_str()
            };
            Expr::Where {
                source: Box::new(source.clone()),
                predicate: bind_lambda(variable, element, &filter.expression, ctx)?,
            }
        }
        None => source.clone(),
    };
    Ok(ctx.apply_null_propagation(&source, Expr::Count(Box::new(counted))))
}

fn bind_in(item: &QueryNode, list: &QueryNode, ctx: &mut BinderContext) -> Result<Expr> {
    let mut item = bind_expression(item, ctx)?;
    let mut list = bind_expression(list, ctx)?;
    let element = collection_element(&list, "in")?;
    let item_type = item.type_ref();
    let literal_items = list
        .constant_value()
        .and_then(Value::as_collection)
        .map(<[Value]>::to_vec);

    if item_type.kind != element.kind && !element.is_untyped() && !item_type.is_untyped() {
        if item_type.enum_name().is_some() && element.is_string() {
            let items = literal_items.ok_or_else(|| {
                BindError::IncompatibleOperandTypes(format!("{item_type} in Collection({element})"))
            })?;
            list = ctx.bind_collection_constant(&items, &item_type.with_nullable(false));
        } else {
            let target = promote(&item_type, &element)?;
            item = ctx.convert_to(item, &target);
            if let Some(items) = literal_items {
                list = ctx.bind_collection_constant(&items, &target.with_nullable(false));
            }
        }
    }

    let is_literal = list.constant_value().is_some();
    let membership = Expr::In {
        item: Box::new(item),
        list: Box::new(list.clone()),
    };
    Ok(if is_literal {
        membership
    } else {
        ctx.apply_null_propagation(&list, membership)
    })
}

fn bind_call(name: &str, args: &[QueryNode], ctx: &mut BinderContext) -> Result<Expr> {
    match (name, args) {
        ("cast" | "isof", [target]) => {
            let type_name = type_name_argument(name, target)?;
            let source = ctx.innermost_range();
            if name == "cast" {
                ctx.bind_cast(source, type_name)
            } else {
                ctx.bind_is_of(source, type_name)
            }
        }
        ("cast" | "isof", [source, target]) => {
            let type_name = type_name_argument(name, target)?;
            let source = bind_expression(source, ctx)?;
            if name == "cast" {
                ctx.bind_cast(source, type_name)
            } else {
                ctx.bind_is_of(source, type_name)
            }
        }
        _ => {
            let args = args
                .iter()
                .map(|arg| bind_expression(arg, ctx))
                .collect::<Result<Vec<_>>>()?;
            ctx.bind_function_call(name, args)
        }
    }
}

fn type_name_argument<'a>(function: &str, node: &'a QueryNode) -> Result<&'a str> {
    match node {
        QueryNode::Constant {
            value: Value::String(type_name),
            ..
        } => Ok(type_name),
        other => Err(BindError::UnsupportedNode(format!(
            "{} as the type argument of '{function}'",
            other.kind_name()
        ))
        .into()),
    }
}
