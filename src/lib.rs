//! odex - query clause to expression compiler
//!
//! Compiles typed query-clause trees (`$filter`, `$orderby`,
//! `$select`/`$expand`, `$apply`) into [`Expr`] trees over a schema
//! [`Model`]. Compiled trees are immutable and `Send + Sync`; they can be
//! evaluated in memory or walked by a provider that translates them.
//!
//! ```ignore
//! let mut ctx = BinderContext::new(model, "NS.Product")?;
//! let predicate = bind_filter(Some(&clause), &mut ctx)?;
//! let matches = predicate.test(&product)?;
//! ```

pub mod ast;
pub mod binder;
pub mod error;
pub mod expr;
pub mod model;
pub mod query;
pub mod settings;
pub mod types;

pub use binder::{
    bind_apply, bind_expression, bind_filter, bind_order_by, bind_select_expand,
    register_function, unregister_function, AggregationBinderResult, BindError, BinderContext,
    FunctionRegistry, FunctionSignature, OrderByBinderResult, SearchBinder,
    SelectExpandBinderResult,
};
pub use error::{OdexError, Result};
pub use expr::{Expr, HostFunction, Lambda, ParamId};
pub use model::Model;
pub use query::{compile, CompiledQuery, InMemoryQueryable, QueryOptions};
pub use settings::{NullPropagation, QuerySettings, SourceKind};
pub use types::{PropertyBag, Record, TypeRef, Value};
