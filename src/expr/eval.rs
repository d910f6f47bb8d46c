//! In-memory evaluation of compiled expressions.
//!
//! Operators are lifted over null: arithmetic with a null operand is null,
//! relational comparisons with a null operand are false, and `==` treats
//! two nulls as equal. `AndAlso`/`OrElse`/`Not` follow three-valued logic.
//! Member access and function calls on null raise `NullReference`.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::error::{OdexError, Result};
use crate::types::convert::{convert, EnumMembers};
use crate::types::{GroupResult, Grouping, PrimitiveKind, PropertyBag, SlotKind, TypeRef, Value};

use super::{AggregateMethod, BinaryOp, Expr, Lambda, ParamId, SortKey, TypeSet};

/// Parameter bindings visible while evaluating a tree.
#[derive(Debug, Clone, Default)]
pub struct Env {
    bindings: Vec<(ParamId, Value)>,
}

impl Env {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` to `id`, shadowing any earlier binding.
    pub fn bind(&mut self, id: ParamId, value: Value) {
        self.bindings.push((id, value));
    }

    fn unbind(&mut self) {
        self.bindings.pop();
    }

    /// Looks up the innermost binding of `id`.
    #[must_use]
    pub fn lookup(&self, id: ParamId) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| *bound == id)
            .map(|(_, value)| value)
    }
}

impl Lambda {
    pub(crate) fn call(&self, env: &mut Env, arg: Value) -> Result<Value> {
        env.bind(self.param, arg);
        let result = self.body.evaluate_in(env);
        env.unbind();
        result
    }

    fn test_in(&self, env: &mut Env, arg: Value) -> Result<bool> {
        Ok(matches!(self.call(env, arg)?, Value::Boolean(true)))
    }
}

impl Expr {
    /// Evaluates the expression against the given bindings.
    ///
    /// # Errors
    ///
    /// Returns `NullReference` for member access or calls on null,
    /// `DivisionByZero` and `Overflow` for failed integer arithmetic, and
    /// `InvalidExpression` for operands of the wrong kind.
    #[allow(clippy::too_many_lines)]
    pub fn evaluate_in(&self, env: &mut Env) -> Result<Value> {
        match self {
            Expr::Constant { value, .. } => Ok(value.clone()),
            Expr::Parameterized(cell) => Ok(cell.value().clone()),
            Expr::Parameter { id, .. } => env.lookup(*id).cloned().ok_or_else(|| {
                OdexError::InvalidExpression(format!("parameter {id} is not bound"))
            }),
            Expr::Property { source, name, .. } => source.evaluate_in(env)?.member(name),
            Expr::DynamicProperty { source, name } => {
                dynamic_member(&source.evaluate_in(env)?, name)
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let left = left.evaluate_in(env)?;
                let right = right.evaluate_in(env)?;
                binary(*op, &left, &right)
            }
            Expr::AndAlso(left, right) => {
                let left = logical(left.evaluate_in(env)?)?;
                if left == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let right = logical(right.evaluate_in(env)?)?;
                Ok(match (left, right) {
                    (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            Expr::OrElse(left, right) => {
                let left = logical(left.evaluate_in(env)?)?;
                if left == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let right = logical(right.evaluate_in(env)?)?;
                Ok(match (left, right) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            Expr::Not(operand) => Ok(match logical(operand.evaluate_in(env)?)? {
                Some(b) => Value::Boolean(!b),
                None => Value::Null,
            }),
            Expr::Negate(operand) => negate(&operand.evaluate_in(env)?),
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => {
                if matches!(test.evaluate_in(env)?, Value::Boolean(true)) {
                    if_true.evaluate_in(env)
                } else {
                    if_false.evaluate_in(env)
                }
            }
            Expr::IsNull(operand) => Ok(Value::Boolean(operand.evaluate_in(env)?.is_null())),
            Expr::IsTrue(operand) => Ok(Value::Boolean(matches!(
                operand.evaluate_in(env)?,
                Value::Boolean(true)
            ))),
            Expr::Convert {
                operand,
                target,
                members,
            } => {
                let value = operand.evaluate_in(env)?;
                let members = members.as_deref().map(|m| m as &dyn EnumMembers);
                convert(&value, &target.kind, members).ok_or_else(|| {
                    OdexError::InvalidExpression(format!(
                        "cannot convert {} to {}",
                        value.type_name(),
                        target.name()
                    ))
                })
            }
            Expr::TryConvert {
                operand,
                target,
                members,
            } => {
                let value = operand.evaluate_in(env)?;
                let members = members.as_deref().map(|m| m as &dyn EnumMembers);
                Ok(convert(&value, &target.kind, members).unwrap_or(Value::Null))
            }
            Expr::TypeIs {
                operand, accepted, ..
            } => Ok(Value::Boolean(is_instance(
                &operand.evaluate_in(env)?,
                accepted,
            ))),
            Expr::TypeAs {
                operand, accepted, ..
            } => {
                let value = operand.evaluate_in(env)?;
                Ok(if is_instance(&value, accepted) {
                    value
                } else {
                    Value::Null
                })
            }
            Expr::Call { function, args, .. } => function.invoke(&evaluate_all(args, env)?),
            Expr::Invoke { function, args, .. } => function.call(&evaluate_all(args, env)?),
            Expr::In { item, list } => {
                let item = item.evaluate_in(env)?;
                let list = collection(list.evaluate_in(env)?, "in")?;
                Ok(Value::Boolean(list.iter().any(|v| values_equal(&item, v))))
            }
            Expr::Any { source, predicate } => {
                let items = collection(source.evaluate_in(env)?, "any")?;
                let Some(predicate) = predicate else {
                    return Ok(Value::Boolean(!items.is_empty()));
                };
                for item in items.iter() {
                    if predicate.test_in(env, item.clone())? {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            Expr::All { source, predicate } => {
                let items = collection(source.evaluate_in(env)?, "all")?;
                for item in items.iter() {
                    if !predicate.test_in(env, item.clone())? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            Expr::Count(source) => {
                let items = collection(source.evaluate_in(env)?, "count")?;
                Ok(Value::Int64(count(items.len())))
            }
            Expr::Where { source, predicate } => {
                let items = collection(source.evaluate_in(env)?, "where")?;
                let mut kept = Vec::with_capacity(items.len());
                for item in items.iter() {
                    if predicate.test_in(env, item.clone())? {
                        kept.push(item.clone());
                    }
                }
                Ok(Value::collection(kept))
            }
            Expr::OfType {
                source, accepted, ..
            } => {
                let items = collection(source.evaluate_in(env)?, "of type")?;
                Ok(Value::collection(
                    items
                        .iter()
                        .filter(|item| is_instance(item, accepted))
                        .cloned()
                        .collect(),
                ))
            }
            Expr::OrderBy { source, keys } => {
                let items = collection(source.evaluate_in(env)?, "order by")?;
                order_by(&items, keys, env)
            }
            Expr::Skip { source, count } => {
                let items = collection(source.evaluate_in(env)?, "skip")?;
                Ok(Value::collection(items.iter().skip(*count).cloned().collect()))
            }
            Expr::Take { source, count } => {
                let items = collection(source.evaluate_in(env)?, "take")?;
                Ok(Value::collection(items.iter().take(*count).cloned().collect()))
            }
            Expr::Select { source, selector } => {
                let items = collection(source.evaluate_in(env)?, "select")?;
                let mut projected = Vec::with_capacity(items.len());
                for item in items.iter() {
                    projected.push(selector.call(env, item.clone())?);
                }
                Ok(Value::collection(projected))
            }
            Expr::SelectMany { source, selector } => {
                let items = collection(source.evaluate_in(env)?, "select many")?;
                let mut flattened = Vec::new();
                for item in items.iter() {
                    match selector.call(env, item.clone())? {
                        Value::Null => {}
                        Value::Collection(inner) => flattened.extend(inner.iter().cloned()),
                        other => flattened.push(other),
                    }
                }
                Ok(Value::collection(flattened))
            }
            Expr::Buffer(source) => match source.evaluate_in(env)? {
                Value::Collection(items) => Ok(Value::collection(items.to_vec())),
                other => Ok(other),
            },
            Expr::Let { param, value, body } => {
                let value = value.evaluate_in(env)?;
                env.bind(*param, value);
                let result = body.evaluate_in(env);
                env.unbind();
                result
            }
            Expr::MakeBag {
                shape,
                instance,
                slots,
            } => {
                let mut bag = match instance {
                    Some(instance) => PropertyBag::with_instance(instance.evaluate_in(env)?),
                    None => PropertyBag::new(),
                };
                for (slot, expr) in shape.slots.iter().zip(slots) {
                    let value = expr.evaluate_in(env)?;
                    if slot.kind == SlotKind::AutoSelected {
                        bag.push_auto_selected(slot.name.clone(), value);
                    } else {
                        bag.push(slot.name.clone(), value);
                    }
                }
                Ok(Value::Bag(Arc::new(bag)))
            }
            Expr::GroupBy { source, key } => {
                let items = collection(source.evaluate_in(env)?, "group by")?;
                let mut groups: IndexMap<Value, Vec<Value>> = IndexMap::new();
                for item in items.iter() {
                    let key = key.call(env, item.clone())?;
                    groups.entry(key).or_default().push(item.clone());
                }
                Ok(Value::collection(
                    groups
                        .into_iter()
                        .map(|(key, elements)| Value::Grouping(Arc::new(Grouping { key, elements })))
                        .collect(),
                ))
            }
            Expr::GroupKey(source) => match source.evaluate_in(env)? {
                Value::Grouping(group) => Ok(group.key.clone()),
                other => Err(not_a_grouping(&other)),
            },
            Expr::GroupElements(source) => match source.evaluate_in(env)? {
                Value::Grouping(group) => Ok(Value::collection(group.elements.clone())),
                other => Err(not_a_grouping(&other)),
            },
            Expr::MakeGroupResult {
                key, aggregates, ..
            } => {
                let key = bag_of(key.evaluate_in(env)?)?;
                let aggregates = bag_of(aggregates.evaluate_in(env)?)?;
                Ok(Value::Group(Arc::new(GroupResult { key, aggregates })))
            }
            Expr::Aggregate {
                source,
                method,
                selector,
                type_ref,
            } => {
                let items = collection(source.evaluate_in(env)?, method.as_str())?;
                aggregate(*method, &items, selector.as_ref(), type_ref, env)
            }
        }
    }
}

fn evaluate_all(args: &[Expr], env: &mut Env) -> Result<Vec<Value>> {
    args.iter().map(|arg| arg.evaluate_in(env)).collect()
}

fn count(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn collection(value: Value, operation: &str) -> Result<Arc<Vec<Value>>> {
    match value {
        Value::Collection(items) => Ok(items),
        Value::Null => Err(OdexError::NullReference(format!(
            "{operation} over a null collection"
        ))),
        other => Err(OdexError::InvalidExpression(format!(
            "{operation} over a {} value",
            other.type_name()
        ))),
    }
}

fn bag_of(value: Value) -> Result<PropertyBag> {
    match value {
        Value::Bag(bag) => Ok(Arc::try_unwrap(bag).unwrap_or_else(|shared| (*shared).clone())),
        other => Err(OdexError::InvalidExpression(format!(
            "expected a record, found {}",
            other.type_name()
        ))),
    }
}

fn not_a_grouping(value: &Value) -> OdexError {
    OdexError::InvalidExpression(format!("expected a grouping, found {}", value.type_name()))
}

fn logical(value: Value) -> Result<Option<bool>> {
    match value {
        Value::Boolean(b) => Ok(Some(b)),
        Value::Null => Ok(None),
        other => Err(OdexError::InvalidExpression(format!(
            "expected a boolean, found {}",
            other.type_name()
        ))),
    }
}

fn dynamic_member(source: &Value, name: &str) -> Result<Value> {
    match source {
        Value::Resource(record) => Ok(record.get_dynamic(name)),
        Value::Bag(bag) => Ok(bag.get(name).unwrap_or(Value::Null)),
        Value::Null => Err(OdexError::NullReference(format!(
            "cannot read dynamic property '{name}' of a null value"
        ))),
        other => Err(OdexError::InvalidExpression(format!(
            "{} has no dynamic properties",
            other.type_name()
        ))),
    }
}

fn is_instance(value: &Value, accepted: &TypeSet) -> bool {
    !value.is_null() && accepted.contains(value.type_name())
}

/// Equality with numeric fallback across kinds (dynamic operands).
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.is_null(), right.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }
    if let Some(ordering) = ordering(left, right) {
        return ordering == Ordering::Equal;
    }
    left == right
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    left.compare(right).or_else(|| {
        let numeric = |v: &Value| v.primitive_kind().is_some_and(|k| k.is_numeric());
        if numeric(left) && numeric(right) {
            Some(left.as_decimal()?.cmp(&right.as_decimal()?))
        } else {
            None
        }
    })
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinaryOp::Equal => Ok(Value::Boolean(values_equal(left, right))),
        BinaryOp::NotEqual => Ok(Value::Boolean(!values_equal(left, right))),
        BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual
        | BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual => {
            let Some(ordering) = ordering(left, right) else {
                return Ok(Value::Boolean(false));
            };
            Ok(Value::Boolean(match op {
                BinaryOp::GreaterThan => ordering == Ordering::Greater,
                BinaryOp::GreaterThanOrEqual => ordering != Ordering::Less,
                BinaryOp::LessThan => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }))
        }
        BinaryOp::Has => match (left, right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Enum(value), Value::Enum(flag)) => {
                Ok(Value::Boolean(value.value & flag.value == flag.value))
            }
            _ => Err(undefined_operator(op, left, right)),
        },
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Modulo => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            arithmetic(op, left, right)
        }
    }
}

fn undefined_operator(op: BinaryOp, left: &Value, right: &Value) -> OdexError {
    OdexError::InvalidExpression(format!(
        "operator '{}' is not defined for {} and {}",
        op.as_str(),
        left.type_name(),
        right.type_name()
    ))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let kinds = (left.primitive_kind(), right.primitive_kind());
    match (left, right) {
        (Value::Single(a), Value::Single(b)) => Ok(Value::Single(float_op(op, *a, *b))),
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(float_op(op, *a, *b))),
        (Value::Decimal(a), Value::Decimal(b)) => decimal_op(op, *a, *b).map(Value::Decimal),
        (Value::DateTimeOffset(a), Value::Duration(d)) => {
            let shifted = match op {
                BinaryOp::Add => a.checked_add_signed(*d),
                BinaryOp::Subtract => a.checked_sub_signed(*d),
                _ => return Err(undefined_operator(op, left, right)),
            };
            shifted
                .map(Value::DateTimeOffset)
                .ok_or_else(|| OdexError::Overflow("date/time out of range".into()))
        }
        (Value::Date(a), Value::Duration(d)) => {
            let days = Duration::days(d.num_days());
            let shifted = match op {
                BinaryOp::Add => a.checked_add_signed(days),
                BinaryOp::Subtract => a.checked_sub_signed(days),
                _ => return Err(undefined_operator(op, left, right)),
            };
            shifted
                .map(Value::Date)
                .ok_or_else(|| OdexError::Overflow("date out of range".into()))
        }
        (Value::DateTimeOffset(a), Value::DateTimeOffset(b)) if op == BinaryOp::Subtract => {
            Ok(Value::Duration(a.signed_duration_since(*b)))
        }
        (Value::Date(a), Value::Date(b)) if op == BinaryOp::Subtract => {
            Ok(Value::Duration(a.signed_duration_since(*b)))
        }
        (Value::Duration(a), Value::Duration(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                _ => return Err(undefined_operator(op, left, right)),
            };
            result
                .map(Value::Duration)
                .ok_or_else(|| OdexError::Overflow("duration out of range".into()))
        }
        _ => match kinds {
            (Some(a), Some(b)) if a == b && a.is_integral() => {
                let (Some(x), Some(y)) = (left.as_int64(), right.as_int64()) else {
                    return Err(undefined_operator(op, left, right));
                };
                narrow(integral_op(op, x, y)?, a)
            }
            _ => Err(undefined_operator(op, left, right)),
        },
    }
}

fn float_op<T>(op: BinaryOp, a: T, b: T) -> T
where
    T: std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + std::ops::Div<Output = T>
        + std::ops::Rem<Output = T>,
{
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        _ => a % b,
    }
}

fn integral_op(op: BinaryOp, a: i64, b: i64) -> Result<i64> {
    if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b == 0 {
        return Err(OdexError::DivisionByZero);
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result.ok_or_else(|| OdexError::Overflow(format!("{a} {} {b}", op.as_str())))
}

fn decimal_op(op: BinaryOp, a: Decimal, b: Decimal) -> Result<Decimal> {
    if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b.is_zero() {
        return Err(OdexError::DivisionByZero);
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result.ok_or_else(|| OdexError::Overflow(format!("{a} {} {b}", op.as_str())))
}

/// Narrows an i64 result back to the operands' integral kind.
fn narrow(value: i64, kind: PrimitiveKind) -> Result<Value> {
    let overflow = || OdexError::Overflow(format!("{value} does not fit {}", kind.name()));
    Ok(match kind {
        PrimitiveKind::Byte => Value::Byte(u8::try_from(value).map_err(|_| overflow())?),
        PrimitiveKind::SByte => Value::SByte(i8::try_from(value).map_err(|_| overflow())?),
        PrimitiveKind::Int16 => Value::Int16(i16::try_from(value).map_err(|_| overflow())?),
        PrimitiveKind::Int32 => Value::Int32(i32::try_from(value).map_err(|_| overflow())?),
        _ => Value::Int64(value),
    })
}

fn negate(value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Single(v) => Ok(Value::Single(-v)),
        Value::Double(v) => Ok(Value::Double(-v)),
        Value::Decimal(v) => Ok(Value::Decimal(-v)),
        Value::Duration(v) => Ok(Value::Duration(-*v)),
        other => match (other.primitive_kind(), other.as_int64()) {
            (Some(kind), Some(v)) if kind.is_integral() => {
                let negated = v
                    .checked_neg()
                    .ok_or_else(|| OdexError::Overflow(format!("-{v}")))?;
                narrow(negated, kind)
            }
            _ => Err(OdexError::InvalidExpression(format!(
                "cannot negate a {} value",
                other.type_name()
            ))),
        },
    }
}

fn order_by(items: &[Value], keys: &[SortKey], env: &mut Env) -> Result<Value> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let mut row = Vec::with_capacity(keys.len());
        for key in keys {
            row.push(key.selector.call(env, item.clone())?);
        }
        keyed.push((row, item.clone()));
    }
    // sort_by is stable, so equal keys keep their input order
    keyed.sort_by(|(a, _), (b, _)| {
        for (index, key) in keys.iter().enumerate() {
            let ordering = a[index].sort_cmp(&b[index]);
            let ordering = if key.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(Value::collection(keyed.into_iter().map(|(_, item)| item).collect()))
}

#[allow(clippy::cast_precision_loss)]
fn aggregate(
    method: AggregateMethod,
    items: &[Value],
    selector: Option<&Lambda>,
    type_ref: &TypeRef,
    env: &mut Env,
) -> Result<Value> {
    if method == AggregateMethod::Count {
        return Ok(Value::Int64(count(items.len())));
    }
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        let value = match selector {
            Some(selector) => selector.call(env, item.clone())?,
            None => item.clone(),
        };
        if !value.is_null() {
            values.push(value);
        }
    }
    match method {
        AggregateMethod::CountDistinct => {
            let distinct: HashSet<&Value> = values.iter().collect();
            Ok(Value::Int64(count(distinct.len())))
        }
        AggregateMethod::Min => Ok(values.into_iter().min_by(Value::sort_cmp).unwrap_or(Value::Null)),
        AggregateMethod::Max => Ok(values.into_iter().max_by(Value::sort_cmp).unwrap_or(Value::Null)),
        AggregateMethod::Sum => sum(&values, type_ref),
        AggregateMethod::Average => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            match sum(&values, type_ref)? {
                Value::Decimal(total) => total
                    .checked_div(Decimal::from(count(values.len())))
                    .map(Value::Decimal)
                    .ok_or_else(|| OdexError::Overflow("average".into())),
                Value::Double(total) => Ok(Value::Double(total / values.len() as f64)),
                other => Err(OdexError::InvalidExpression(format!(
                    "cannot average {} values",
                    other.type_name()
                ))),
            }
        }
        AggregateMethod::Count => Ok(Value::Int64(count(items.len()))),
    }
}

fn sum(values: &[Value], type_ref: &TypeRef) -> Result<Value> {
    let non_numeric = |v: &Value| {
        OdexError::InvalidExpression(format!("cannot sum a {} value", v.type_name()))
    };
    match type_ref.primitive_kind() {
        Some(PrimitiveKind::Int64) => {
            let mut total: i64 = 0;
            for value in values {
                let v = value.as_int64().ok_or_else(|| non_numeric(value))?;
                total = total
                    .checked_add(v)
                    .ok_or_else(|| OdexError::Overflow("sum".into()))?;
            }
            Ok(Value::Int64(total))
        }
        Some(PrimitiveKind::Decimal) => {
            let mut total = Decimal::ZERO;
            for value in values {
                let v = value.as_decimal().ok_or_else(|| non_numeric(value))?;
                total = total
                    .checked_add(v)
                    .ok_or_else(|| OdexError::Overflow("sum".into()))?;
            }
            Ok(Value::Decimal(total))
        }
        _ => {
            let mut total = 0.0;
            for value in values {
                total += value.as_float64().ok_or_else(|| non_numeric(value))?;
            }
            Ok(Value::Double(total))
        }
    }
}
