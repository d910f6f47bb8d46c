//! Binding primitives shared by every clause binder.
//!
//! Constants, property access, null propagation, numeric promotion, casts
//! and function calls are compiled here so that filter, orderby,
//! select/expand and aggregation agree on their semantics.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::ast::ComputeClause;
use crate::error::Result;
use crate::expr::{BuiltinFunction, Expr, TypeSet};
use crate::model::EnumType;
use crate::types::convert::{convert, EnumMembers};
use crate::types::{PrimitiveKind, TypeKind, TypeRef, Value};

use super::context::BinderContext;
use super::filter::bind_expression;
use super::functions::{builtin_signatures, resolve_overload, FunctionSignature};
use super::BindError;

/// Computes the common type of two operands.
///
/// Numeric kinds promote to the wider kind, enums promote to `Int64`
/// against integral operands, `Date` promotes to `DateTimeOffset`, and a
/// dynamic operand makes the comparison dynamic.
///
/// # Errors
///
/// Returns `IncompatibleOperandTypes` when no common type exists.
pub fn promote(left: &TypeRef, right: &TypeRef) -> Result<TypeRef> {
    use PrimitiveKind as P;

    let nullable = left.nullable || right.nullable;
    if left.kind == right.kind {
        return Ok(left.with_nullable(nullable));
    }
    if left.is_untyped() || right.is_untyped() {
        return Ok(TypeRef::untyped());
    }
    let promoted = match (&left.kind, &right.kind) {
        (TypeKind::Primitive(a), TypeKind::Primitive(b)) => match (a.numeric_rank(), b.numeric_rank()) {
            _ if matches!((a, b), (P::Byte, P::SByte) | (P::SByte, P::Byte)) => Some(P::Int16),
            (Some(ra), Some(rb)) => Some(if ra >= rb { *a } else { *b }),
            _ if matches!(
                (a, b),
                (P::Date, P::DateTimeOffset) | (P::DateTimeOffset, P::Date)
            ) =>
            {
                Some(P::DateTimeOffset)
            }
            _ => None,
        },
        (TypeKind::Enum(_), TypeKind::Primitive(kind))
        | (TypeKind::Primitive(kind), TypeKind::Enum(_))
            if kind.is_integral() =>
        {
            Some(P::Int64)
        }
        _ => None,
    };
    promoted
        .map(|kind| TypeRef::primitive(kind, nullable))
        .ok_or_else(|| BindError::IncompatibleOperandTypes(format!("{left} and {right}")).into())
}

fn not_found(type_name: &str, property: &str) -> BindError {
    BindError::PropertyNotFound {
        type_name: type_name.to_string(),
        property: property.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    value.primitive_kind().is_some() || matches!(value, Value::Enum(_))
}

impl BinderContext {
    /// Compiles a literal. Scalars are hoisted into shared cells when
    /// parameterization is enabled; null is always inlined as a typed null.
    #[must_use]
    pub fn bind_constant(&self, value: Value, type_ref: TypeRef) -> Expr {
        if value.is_null() {
            return Expr::null(&type_ref);
        }
        if self.settings().enable_constant_parameterization && is_scalar(&value) {
            Expr::Parameterized(self.constant_cell(value, type_ref))
        } else {
            Expr::constant(value, type_ref)
        }
    }

    /// Compiles a literal list, converting the items to `item_type`.
    #[must_use]
    pub fn bind_collection_constant(&self, items: &[Value], item_type: &TypeRef) -> Expr {
        let members = self.enum_members(item_type);
        let items = items
            .iter()
            .map(|item| {
                convert(item, &item_type.kind, members.as_deref().map(|m| m as &dyn EnumMembers))
                    .unwrap_or_else(|| item.clone())
            })
            .collect::<Vec<_>>();
        Expr::constant(Value::collection(items), TypeRef::collection(item_type.clone()))
    }

    /// Compiles `source/name` for a declared property (structural or
    /// navigation), a record slot, or an open-type property.
    ///
    /// # Errors
    ///
    /// Returns `PropertyNotFound` if the property is not declared and the
    /// type is not open.
    pub fn bind_property_access(&self, source: Expr, name: &str) -> Result<Expr> {
        let source_type = source.type_ref();
        let member_type = match &source_type.kind {
            TypeKind::Entity(type_name) | TypeKind::Complex(type_name) => {
                match self.model().find_member(type_name, name) {
                    Some(member) => member.type_ref(),
                    None if self.model().is_open(type_name) => {
                        return self.bind_dynamic_property(source, name);
                    }
                    None => return Err(not_found(type_name, name).into()),
                }
            }
            TypeKind::Record(shape) => match shape.slot(name) {
                Some(slot) => slot.type_ref.clone(),
                None => match shape.instance_type.as_ref().and_then(TypeRef::structured_name) {
                    Some(type_name) => self
                        .model()
                        .find_member(type_name, name)
                        .map(|member| member.type_ref())
                        .ok_or_else(|| not_found(type_name, name))?,
                    None => return Err(not_found("Record", name).into()),
                },
            },
            TypeKind::Untyped => return self.bind_dynamic_property(source, name),
            _ => return Err(not_found(&source_type.name(), name).into()),
        };
        let access = Expr::property(source.clone(), name, member_type);
        Ok(self.apply_null_propagation(&source, access))
    }

    /// Compiles a lookup in the dynamic dictionary of an open type.
    ///
    /// # Errors
    ///
    /// Returns `PropertyNotFound` if the source type is closed.
    pub fn bind_dynamic_property(&self, source: Expr, name: &str) -> Result<Expr> {
        let source_type = source.type_ref();
        match source_type.structured_name() {
            Some(type_name) if !self.model().is_open(type_name) => {
                return Err(not_found(type_name, name).into());
            }
            Some(_) => {}
            None if source_type.is_untyped() || source_type.record_shape().is_some() => {}
            None => return Err(not_found(&source_type.name(), name).into()),
        }
        let access = Expr::DynamicProperty {
            source: Box::new(source.clone()),
            name: name.to_string(),
        };
        Ok(self.apply_null_propagation(&source, access))
    }

    /// Guards `access` (an expression reading from `source`) so that a null
    /// `source` yields a typed null instead of a null reference.
    ///
    /// Only applies when propagation is in effect and `source` is nullable.
    #[must_use]
    pub fn apply_null_propagation(&self, source: &Expr, access: Expr) -> Expr {
        if !self.propagates_nulls() || !source.type_ref().nullable {
            return access;
        }
        guard_null(source, access)
    }

    /// Converts `expr` to `target` for promotion. Constants are folded.
    #[must_use]
    pub fn convert_to(&self, expr: Expr, target: &TypeRef) -> Expr {
        let source_type = expr.type_ref();
        if source_type.kind == target.kind || target.is_untyped() {
            return expr;
        }
        let target = target.with_nullable(source_type.nullable);
        let members = self.enum_members(&target);
        if let Some(value) = expr.constant_value() {
            let converted = convert(
                value,
                &target.kind,
                members.as_deref().map(|m| m as &dyn EnumMembers),
            );
            if let Some(converted) = converted {
                return self.bind_constant(converted, target);
            }
        }
        Expr::Convert {
            operand: Box::new(expr),
            target,
            members,
        }
    }

    /// Compiles `cast(source, type_name)`.
    ///
    /// Casting to a structured type narrows at runtime (null on mismatch);
    /// casting to a primitive or enum converts (null when undefined). A
    /// cast to the operand's own type returns the operand.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCast` for unknown types and for casts between
    /// unrelated structured types.
    pub fn bind_cast(&self, source: Expr, type_name: &str) -> Result<Expr> {
        let target = self.resolve_cast_target(type_name)?;
        let source_type = source.type_ref();
        if let Some(target_name) = target.structured_name() {
            if !source_type.is_untyped() && !source.is_null_constant() {
                let source_name = self.check_related(&source_type, target_name)?;
                if self.model().is_derived_from(source_name, target_name) {
                    return Ok(source);
                }
            }
            return Ok(Expr::TypeAs {
                operand: Box::new(source),
                type_name: target_name.to_string(),
                accepted: self.accepted_types(target_name),
                type_ref: target.as_nullable(),
            });
        }
        if source_type.structured_name().is_some() || source_type.is_collection() {
            trace!(%source_type, %target, "Undefined conversion binds to null");
            return Ok(Expr::null(&target.as_nullable()));
        }
        if source_type.kind == target.kind {
            return Ok(source);
        }
        let members = self.enum_members(&target);
        if let Some(value) = source.constant_value() {
            let converted = convert(
                value,
                &target.kind,
                members.as_deref().map(|m| m as &dyn EnumMembers),
            )
            .unwrap_or(Value::Null);
            return Ok(self.bind_constant(converted, target.as_nullable()));
        }
        Ok(Expr::TryConvert {
            operand: Box::new(source),
            target: target.as_nullable(),
            members,
        })
    }

    /// Compiles `isof(source, type_name)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCast` for unknown types and for tests between
    /// unrelated structured types.
    pub fn bind_is_of(&self, source: Expr, type_name: &str) -> Result<Expr> {
        let target = self.resolve_cast_target(type_name)?;
        let source_type = source.type_ref();
        let accepted = match target.structured_name() {
            Some(target_name) => {
                if !source_type.is_untyped() && !source.is_null_constant() {
                    self.check_related(&source_type, target_name)?;
                }
                self.accepted_types(target_name)
            }
            None => {
                if source_type.structured_name().is_some() || source_type.is_collection() {
                    return Ok(Expr::boolean(false));
                }
                Arc::new(std::iter::once(target.name()).collect())
            }
        };
        Ok(Expr::TypeIs {
            operand: Box::new(source),
            type_name: target.name(),
            accepted,
        })
    }

    /// Compiles a type segment: `OfType` over a collection, a narrowing
    /// cast over a single resource.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCast` if the segment names an unrelated or unknown
    /// structured type.
    pub fn bind_resource_cast(&self, source: Expr, type_name: &str) -> Result<Expr> {
        let source_type = source.type_ref();
        let Some(element) = source_type.element_type() else {
            return self.bind_cast(source, type_name);
        };
        if self.model().structured_type(type_name).is_none() {
            return Err(BindError::InvalidCast(format!("unknown type '{type_name}'")).into());
        }
        self.check_related(element, type_name)?;
        let filtered = Expr::OfType {
            source: Box::new(source.clone()),
            type_name: type_name.to_string(),
            accepted: self.accepted_types(type_name),
        };
        Ok(self.apply_null_propagation(&source, filtered))
    }

    /// Compiles a function call: custom functions first, then built-ins.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFunction` if neither knows the name and
    /// `IncompatibleOperandTypes` if no overload accepts the arguments.
    pub fn bind_function_call(&self, name: &str, args: Vec<Expr>) -> Result<Expr> {
        let arg_types: Vec<TypeRef> = args.iter().map(Expr::type_ref).collect();
        let nullable = arg_types.iter().any(|t| t.nullable);

        let custom = self.functions().lookup(name);
        if let Some(overloads) = &custom {
            if let Some((signature, function)) = resolve_overload(overloads, &arg_types) {
                debug!(function = name, "Binding custom function");
                let args = self.coerce_arguments(args, signature);
                let call = Expr::Invoke {
                    function: function.clone(),
                    type_ref: signature
                        .return_type
                        .with_nullable(signature.return_type.nullable || nullable),
                    args: args.clone(),
                };
                return Ok(self.guard_arguments(&args, call));
            }
        }

        let Some(function) = BuiltinFunction::from_name(name) else {
            let err = match custom {
                Some(_) => no_overload(name, &arg_types),
                None => BindError::UnknownFunction(name.to_string()),
            };
            return Err(err.into());
        };
        let overloads: Vec<(FunctionSignature, ())> = builtin_signatures(function)
            .into_iter()
            .map(|signature| (signature, ()))
            .collect();
        let (signature, ()) =
            resolve_overload(&overloads, &arg_types).ok_or_else(|| no_overload(name, &arg_types))?;
        trace!(function = name, "Binding built-in function");
        let args = self.coerce_arguments(args, signature);
        let call = Expr::Call {
            function,
            type_ref: signature.return_type.with_nullable(nullable),
            args: args.clone(),
        };
        Ok(self.guard_arguments(&args, call))
    }

    /// Binds a `$compute` clause, making each alias resolvable as a
    /// property of `$it` for the rest of this context.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while binding an item.
    pub fn bind_compute(&mut self, compute: &ComputeClause) -> Result<Vec<(String, Expr)>> {
        let mut bound = Vec::with_capacity(compute.items.len());
        for item in &compute.items {
            let expr = bind_expression(&item.expression, self)?;
            debug!(alias = %item.alias, type_ref = %expr.type_ref(), "Bound computed property");
            self.add_computed(item.alias.clone(), expr.clone());
            bound.push((item.alias.clone(), expr));
        }
        Ok(bound)
    }

    pub(crate) fn enum_members(&self, type_ref: &TypeRef) -> Option<Arc<EnumType>> {
        type_ref
            .enum_name()
            .and_then(|name| self.model().enum_type(name))
            .map(|e| Arc::new(e.clone()))
    }

    pub(crate) fn accepted_types(&self, type_name: &str) -> TypeSet {
        Arc::new(self.model().derived_types(type_name))
    }

    fn resolve_cast_target(&self, type_name: &str) -> Result<TypeRef> {
        self.model()
            .resolve_type_name(type_name)
            .ok_or_else(|| BindError::InvalidCast(format!("unknown type '{type_name}'")).into())
    }

    /// Returns the structured name of `source_type` if it is related to
    /// `target_name`.
    fn check_related<'t>(&self, source_type: &'t TypeRef, target_name: &str) -> Result<&'t str> {
        match source_type.structured_name() {
            Some(source_name) if self.model().is_related(source_name, target_name) => Ok(source_name),
            _ => Err(BindError::InvalidCast(format!("{source_type} to {target_name}")).into()),
        }
    }

    fn coerce_arguments(&self, args: Vec<Expr>, signature: &FunctionSignature) -> Vec<Expr> {
        args.into_iter()
            .zip(&signature.parameters)
            .map(|(arg, parameter)| {
                let arg_type = arg.type_ref();
                if parameter.is_untyped() || arg_type.kind == parameter.kind {
                    arg
                } else if arg_type.is_untyped() {
                    Expr::TryConvert {
                        operand: Box::new(arg),
                        target: parameter.as_nullable(),
                        members: self.enum_members(parameter),
                    }
                } else {
                    self.convert_to(arg, parameter)
                }
            })
            .collect()
    }

    /// In propagating mode a call over a nullable argument yields null
    /// instead of failing.
    fn guard_arguments(&self, args: &[Expr], call: Expr) -> Expr {
        if !self.propagates_nulls() {
            return call;
        }
        let test = args
            .iter()
            .filter(|arg| arg.type_ref().nullable)
            .map(|arg| Expr::is_null(arg.clone()))
            .reduce(Expr::or_else);
        match test {
            Some(test) => {
                let type_ref = call.type_ref().as_nullable();
                Expr::conditional(test, Expr::null(&type_ref), call)
            }
            None => call,
        }
    }
}

/// `source == null ? null : access`.
pub(crate) fn guard_null(source: &Expr, access: Expr) -> Expr {
    let type_ref = access.type_ref().as_nullable();
    Expr::conditional(Expr::is_null(source.clone()), Expr::null(&type_ref), access)
}

fn no_overload(name: &str, arg_types: &[TypeRef]) -> BindError {
    let types = arg_types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    BindError::IncompatibleOperandTypes(format!("no overload of '{name}' accepts ({types})"))
}
