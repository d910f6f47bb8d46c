//! Binders that compile query clauses into expression trees.
//!
//! Every binder works against a [`BinderContext`] and shares the primitives
//! in `base`:
//! - `filter` lowers any node to an expression and builds predicates
//! - `orderby` builds key selectors from the same node compiler
//! - `select_expand` builds projectors producing property bags
//! - `aggregation` builds group/aggregate pipelines
//!
//! The output is an [`Expr`](crate::expr::Expr) tree ready for in-memory
//! evaluation or translation by a remote provider.

mod aggregation;
mod base;
mod context;
mod filter;
mod functions;
mod orderby;
mod scope;
mod select_expand;

use crate::error::OdexError;

pub use aggregation::{bind_apply, AggregationBinderResult};
pub use base::promote;
pub use context::{BinderContext, RangeGuard, SearchBinder};
pub use filter::{bind_expression, bind_filter};
pub use functions::{
    builtin_signatures, register_function, unregister_function, FunctionRegistry,
    FunctionSignature,
};
pub use orderby::{bind_order_by, OrderByBinderResult};
pub use scope::{RangeScope, RangeVariable};
pub use select_expand::{bind_select_expand, SelectExpandBinderResult};

/// Errors raised while compiling a clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// A required clause argument was absent.
    ArgumentNull(String),
    /// Function name not found in the custom registry or the built-ins.
    UnknownFunction(String),
    /// Operand types cannot be promoted to a common type.
    IncompatibleOperandTypes(String),
    /// Cast or type test between unrelated types.
    InvalidCast(String),
    /// Property not declared on the type (and the type is not open).
    PropertyNotFound { type_name: String, property: String },
    /// Node kind not supported in this position.
    UnsupportedNode(String),
    /// Range variable already bound in the enclosing chain.
    DuplicateVariable(String),
    /// Range variable not bound.
    UndefinedVariable(String),
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindError::ArgumentNull(name) => write!(f, "Argument '{name}' is required"),
            BindError::UnknownFunction(name) => write!(f, "Unknown function: {name}"),
            BindError::IncompatibleOperandTypes(message) => {
                write!(f, "Incompatible operand types: {message}")
            }
            BindError::InvalidCast(message) => write!(f, "Invalid cast: {message}"),
            BindError::PropertyNotFound {
                type_name,
                property,
            } => write!(f, "Property '{property}' not found on type '{type_name}'"),
            BindError::UnsupportedNode(kind) => write!(f, "Unsupported node: {kind}"),
            BindError::DuplicateVariable(name) => write!(f, "Duplicate variable: {name}"),
            BindError::UndefinedVariable(name) => write!(f, "Undefined variable: {name}"),
        }
    }
}

impl std::error::Error for BindError {}

impl From<BindError> for OdexError {
    fn from(err: BindError) -> Self {
        OdexError::Bind(err)
    }
}
