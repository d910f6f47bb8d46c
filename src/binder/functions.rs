//! Function signatures and the custom-function registry.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::expr::{BuiltinFunction, HostFunction};
use crate::types::{PrimitiveKind, TypeKind, TypeRef};

/// Parameter and return types of one function overload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub parameters: Vec<TypeRef>,
    pub return_type: TypeRef,
}

impl FunctionSignature {
    #[must_use]
    pub fn new(parameters: Vec<TypeRef>, return_type: TypeRef) -> Self {
        FunctionSignature {
            parameters,
            return_type,
        }
    }

    /// How well the argument types fit this overload: `Some(true)` for an
    /// exact match, `Some(false)` when promotion is needed, None when the
    /// overload does not apply.
    fn fit(&self, args: &[TypeRef]) -> Option<bool> {
        if self.parameters.len() != args.len() {
            return None;
        }
        let mut exact = true;
        for (parameter, arg) in self.parameters.iter().zip(args) {
            if parameter.kind == arg.kind || parameter.is_untyped() || arg.is_untyped() {
                continue;
            }
            if !widens_to(arg, parameter) {
                return None;
            }
            exact = false;
        }
        Some(exact)
    }
}

/// Returns whether a value of type `from` converts implicitly to `to`.
pub(crate) fn widens_to(from: &TypeRef, to: &TypeRef) -> bool {
    match (&from.kind, &to.kind) {
        (TypeKind::Primitive(a), TypeKind::Primitive(b)) => match (a.numeric_rank(), b.numeric_rank()) {
            (Some(ra), Some(rb)) => ra <= rb,
            _ => *a == PrimitiveKind::Date && *b == PrimitiveKind::DateTimeOffset,
        },
        (TypeKind::Collection(a), TypeKind::Collection(b)) => a.kind == b.kind || widens_to(a, b),
        _ => false,
    }
}

/// Picks the first exact overload, else the first one reachable by
/// promotion.
pub(crate) fn resolve_overload<'a, T>(
    overloads: &'a [(FunctionSignature, T)],
    args: &[TypeRef],
) -> Option<&'a (FunctionSignature, T)> {
    overloads
        .iter()
        .find(|(sig, _)| sig.fit(args) == Some(true))
        .or_else(|| overloads.iter().find(|(sig, _)| sig.fit(args).is_some()))
}

/// Overloads of a built-in function, narrowest first.
#[must_use]
pub fn builtin_signatures(function: BuiltinFunction) -> Vec<FunctionSignature> {
    use PrimitiveKind as P;

    let p = |kind: P| TypeRef::primitive(kind, false);
    let unary = |from: P, to: P| FunctionSignature::new(vec![p(from)], p(to));
    let strings = |to: P| FunctionSignature::new(vec![p(P::String), p(P::String)], p(to));

    match function {
        BuiltinFunction::Contains | BuiltinFunction::StartsWith | BuiltinFunction::EndsWith => {
            vec![strings(P::Boolean)]
        }
        BuiltinFunction::Length => vec![unary(P::String, P::Int32)],
        BuiltinFunction::IndexOf => vec![strings(P::Int32)],
        BuiltinFunction::Substring => vec![
            FunctionSignature::new(vec![p(P::String), p(P::Int32)], p(P::String)),
            FunctionSignature::new(vec![p(P::String), p(P::Int32), p(P::Int32)], p(P::String)),
        ],
        BuiltinFunction::ToLower | BuiltinFunction::ToUpper | BuiltinFunction::Trim => {
            vec![unary(P::String, P::String)]
        }
        BuiltinFunction::Concat => vec![strings(P::String)],
        BuiltinFunction::Year | BuiltinFunction::Month | BuiltinFunction::Day => vec![
            unary(P::DateTimeOffset, P::Int32),
            unary(P::Date, P::Int32),
        ],
        BuiltinFunction::Hour | BuiltinFunction::Minute | BuiltinFunction::Second => vec![
            unary(P::DateTimeOffset, P::Int32),
            unary(P::TimeOfDay, P::Int32),
        ],
        BuiltinFunction::FractionalSeconds => vec![
            unary(P::DateTimeOffset, P::Decimal),
            unary(P::TimeOfDay, P::Decimal),
        ],
        BuiltinFunction::Date => vec![unary(P::DateTimeOffset, P::Date)],
        BuiltinFunction::Time => vec![unary(P::DateTimeOffset, P::TimeOfDay)],
        BuiltinFunction::TotalOffsetMinutes => vec![unary(P::DateTimeOffset, P::Int32)],
        BuiltinFunction::TotalSeconds => vec![unary(P::Duration, P::Decimal)],
        BuiltinFunction::Now | BuiltinFunction::MinDateTime | BuiltinFunction::MaxDateTime => {
            vec![FunctionSignature::new(Vec::new(), p(P::DateTimeOffset))]
        }
        BuiltinFunction::Round | BuiltinFunction::Floor | BuiltinFunction::Ceiling => vec![
            unary(P::Double, P::Double),
            unary(P::Decimal, P::Decimal),
            unary(P::Single, P::Single),
        ],
    }
}

type Overloads = Vec<(FunctionSignature, HostFunction)>;

static GLOBAL_REGISTRY: Lazy<Arc<FunctionRegistry>> = Lazy::new(|| Arc::new(FunctionRegistry::new()));

/// Custom functions by name, each with one or more overloads.
///
/// Custom overloads are tried before built-ins of the same name.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Overloads>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry used by contexts that were not
    /// given their own.
    #[must_use]
    pub fn global() -> Arc<FunctionRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Adds an overload.
    pub fn register(&self, name: impl Into<String>, signature: FunctionSignature, function: HostFunction) {
        let name = name.into();
        debug!(function = %name, arity = signature.parameters.len(), "Registering custom function");
        self.functions
            .write()
            .entry(name)
            .or_default()
            .push((signature, function));
    }

    /// Removes every overload of `name` backed by `function`. Returns
    /// whether anything was removed.
    pub fn unregister(&self, name: &str, function: &HostFunction) -> bool {
        let mut functions = self.functions.write();
        let Some(overloads) = functions.get_mut(name) else {
            return false;
        };
        let before = overloads.len();
        overloads.retain(|(_, f)| f != function);
        let removed = overloads.len() != before;
        if overloads.is_empty() {
            functions.remove(name);
        }
        removed
    }

    /// Returns the overloads registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Vec<(FunctionSignature, HostFunction)>> {
        self.functions.read().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }
}

/// Registers an overload in the process-wide registry.
pub fn register_function(name: impl Into<String>, signature: FunctionSignature, function: HostFunction) {
    GLOBAL_REGISTRY.register(name, signature, function);
}

/// Removes overloads from the process-wide registry.
pub fn unregister_function(name: &str, function: &HostFunction) -> bool {
    GLOBAL_REGISTRY.unregister(name, function)
}
