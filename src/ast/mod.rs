//! Typed query AST consumed by the binders.
//!
//! Trees are produced by an external parser and never mutated here.

mod clause;
mod node;

pub use clause::{
    AggregateClause, AggregateExpression, AggregationMethod, ComputeClause, ComputeExpression,
    ExpandItem, ExpandOptions, FilterClause, GroupByClause, GroupByPropertyNode, OrderByClause,
    OrderByDirection, PathSegment, PathSelectItem, SearchClause, SearchNode, SelectExpandClause,
    SelectItem,
};
pub use node::{
    BinaryOperatorKind, QueryNode, UnaryOperatorKind, IMPLICIT_RANGE_VARIABLE,
    THIS_RANGE_VARIABLE,
};
