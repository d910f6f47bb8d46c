//! Query node tree for one clause fragment.

use crate::types::{TypeRef, Value};

use super::clause::FilterClause;

/// Name of the implicit range variable bound to the clause's element.
pub const IMPLICIT_RANGE_VARIABLE: &str = "$it";

/// Name of the range variable bound to the element of a nested `$count` filter.
pub const THIS_RANGE_VARIABLE: &str = "$this";

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperatorKind {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    And,
    Or,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// Enum flag test.
    Has,
}

impl BinaryOperatorKind {
    /// Returns the query-language keyword for the operator.
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            BinaryOperatorKind::Equal => "eq",
            BinaryOperatorKind::NotEqual => "ne",
            BinaryOperatorKind::GreaterThan => "gt",
            BinaryOperatorKind::GreaterThanOrEqual => "ge",
            BinaryOperatorKind::LessThan => "lt",
            BinaryOperatorKind::LessThanOrEqual => "le",
            BinaryOperatorKind::And => "and",
            BinaryOperatorKind::Or => "or",
            BinaryOperatorKind::Add => "add",
            BinaryOperatorKind::Subtract => "sub",
            BinaryOperatorKind::Multiply => "mul",
            BinaryOperatorKind::Divide => "div",
            BinaryOperatorKind::Modulo => "mod",
            BinaryOperatorKind::Has => "has",
        }
    }

    /// Returns true for `eq ne gt ge lt le`.
    #[must_use]
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperatorKind::Equal
                | BinaryOperatorKind::NotEqual
                | BinaryOperatorKind::GreaterThan
                | BinaryOperatorKind::GreaterThanOrEqual
                | BinaryOperatorKind::LessThan
                | BinaryOperatorKind::LessThanOrEqual
        )
    }

    /// Returns true for `add sub mul div mod`.
    #[must_use]
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperatorKind::Add
                | BinaryOperatorKind::Subtract
                | BinaryOperatorKind::Multiply
                | BinaryOperatorKind::Divide
                | BinaryOperatorKind::Modulo
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperatorKind {
    Not,
    Negate,
}

/// A parsed, typed query node.
///
/// Constants and implicit conversions carry the type the parser resolved;
/// every other node's type is derived from the model while binding.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Literal value. `type_ref` of None infers the type from the value.
    Constant {
        value: Value,
        type_ref: Option<TypeRef>,
    },
    /// Literal list (right-hand side of `in`).
    CollectionConstant { items: Vec<Value>, item_type: TypeRef },
    BinaryOperator {
        op: BinaryOperatorKind,
        left: Box<QueryNode>,
        right: Box<QueryNode>,
    },
    UnaryOperator {
        op: UnaryOperatorKind,
        operand: Box<QueryNode>,
    },
    /// Conversion inserted by the parser.
    Convert { source: Box<QueryNode>, target: TypeRef },
    /// Reference to `$it`, `$this` or a lambda variable.
    RangeVariable { name: String },
    /// Structural or navigation property (single or collection valued).
    Property { source: Box<QueryNode>, name: String },
    /// Open-type property stored in the dynamic dictionary.
    DynamicProperty { source: Box<QueryNode>, name: String },
    /// Type segment over a single resource or a resource collection.
    ResourceCast {
        source: Box<QueryNode>,
        type_name: String,
    },
    Any {
        source: Box<QueryNode>,
        variable: String,
        body: Option<Box<QueryNode>>,
    },
    All {
        source: Box<QueryNode>,
        variable: String,
        body: Box<QueryNode>,
    },
    FunctionCall { name: String, args: Vec<QueryNode> },
    /// `cast(x, T)`, or `cast(T)` over the range variable when `source` is None.
    Cast {
        source: Option<Box<QueryNode>>,
        type_name: String,
    },
    /// `isof(x, T)`, or `isof(T)` over the range variable when `source` is None.
    IsOf {
        source: Option<Box<QueryNode>>,
        type_name: String,
    },
    /// `$count` of a collection, optionally over a nested filter that refers
    /// to the element as `$this`.
    Count {
        source: Box<QueryNode>,
        filter: Option<Box<FilterClause>>,
    },
    In {
        item: Box<QueryNode>,
        list: Box<QueryNode>,
    },
    /// `@alias`, with the value it resolved to (if any).
    ParameterAlias {
        alias: String,
        value: Option<Box<QueryNode>>,
    },
}

impl QueryNode {
    /// `$it`.
    #[must_use]
    pub fn it() -> Self {
        Self::range(IMPLICIT_RANGE_VARIABLE)
    }

    /// `$this`.
    #[must_use]
    pub fn this() -> Self {
        Self::range(THIS_RANGE_VARIABLE)
    }

    /// A range variable reference.
    #[must_use]
    pub fn range(name: impl Into<String>) -> Self {
        QueryNode::RangeVariable { name: name.into() }
    }

    /// Property of `$it`.
    #[must_use]
    pub fn prop(name: impl Into<String>) -> Self {
        Self::it().property(name)
    }

    /// Property of `$this`, the implicit element of clauses nested in an
    /// expansion.
    #[must_use]
    pub fn this_prop(name: impl Into<String>) -> Self {
        Self::this().property(name)
    }

    /// Property of this node.
    #[must_use]
    pub fn property(self, name: impl Into<String>) -> Self {
        QueryNode::Property {
            source: Box::new(self),
            name: name.into(),
        }
    }

    /// Dynamic property of this node.
    #[must_use]
    pub fn dynamic(self, name: impl Into<String>) -> Self {
        QueryNode::DynamicProperty {
            source: Box::new(self),
            name: name.into(),
        }
    }

    /// Type segment over this node.
    #[must_use]
    pub fn cast_to(self, type_name: impl Into<String>) -> Self {
        QueryNode::ResourceCast {
            source: Box::new(self),
            type_name: type_name.into(),
        }
    }

    /// Constant with an inferred type.
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        QueryNode::Constant {
            value: value.into(),
            type_ref: None,
        }
    }

    /// Constant with an explicit type.
    #[must_use]
    pub fn typed_constant(value: impl Into<Value>, type_ref: TypeRef) -> Self {
        QueryNode::Constant {
            value: value.into(),
            type_ref: Some(type_ref),
        }
    }

    /// Null literal.
    #[must_use]
    pub fn null() -> Self {
        QueryNode::Constant {
            value: Value::Null,
            type_ref: None,
        }
    }

    #[must_use]
    pub fn binary(op: BinaryOperatorKind, left: QueryNode, right: QueryNode) -> Self {
        QueryNode::BinaryOperator {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn eq(left: QueryNode, right: QueryNode) -> Self {
        Self::binary(BinaryOperatorKind::Equal, left, right)
    }

    #[must_use]
    pub fn ne(left: QueryNode, right: QueryNode) -> Self {
        Self::binary(BinaryOperatorKind::NotEqual, left, right)
    }

    #[must_use]
    pub fn gt(left: QueryNode, right: QueryNode) -> Self {
        Self::binary(BinaryOperatorKind::GreaterThan, left, right)
    }

    #[must_use]
    pub fn lt(left: QueryNode, right: QueryNode) -> Self {
        Self::binary(BinaryOperatorKind::LessThan, left, right)
    }

    #[must_use]
    pub fn and(left: QueryNode, right: QueryNode) -> Self {
        Self::binary(BinaryOperatorKind::And, left, right)
    }

    #[must_use]
    pub fn or(left: QueryNode, right: QueryNode) -> Self {
        Self::binary(BinaryOperatorKind::Or, left, right)
    }

    #[must_use]
    pub fn not(operand: QueryNode) -> Self {
        QueryNode::UnaryOperator {
            op: UnaryOperatorKind::Not,
            operand: Box::new(operand),
        }
    }

    #[must_use]
    pub fn negate(operand: QueryNode) -> Self {
        QueryNode::UnaryOperator {
            op: UnaryOperatorKind::Negate,
            operand: Box::new(operand),
        }
    }

    /// Function call.
    #[must_use]
    pub fn call(name: impl Into<String>, args: Vec<QueryNode>) -> Self {
        QueryNode::FunctionCall {
            name: name.into(),
            args,
        }
    }

    /// `source/any(variable: body)`.
    #[must_use]
    pub fn any(source: QueryNode, variable: impl Into<String>, body: QueryNode) -> Self {
        QueryNode::Any {
            source: Box::new(source),
            variable: variable.into(),
            body: Some(Box::new(body)),
        }
    }

    /// `source/any()`.
    #[must_use]
    pub fn any_empty(source: QueryNode) -> Self {
        QueryNode::Any {
            source: Box::new(source),
            variable: String::new(),
            body: None,
        }
    }

    /// `source/all(variable: body)`.
    #[must_use]
    pub fn all(source: QueryNode, variable: impl Into<String>, body: QueryNode) -> Self {
        QueryNode::All {
            source: Box::new(source),
            variable: variable.into(),
            body: Box::new(body),
        }
    }

    /// `cast(source, T)`.
    #[must_use]
    pub fn cast(source: QueryNode, type_name: impl Into<String>) -> Self {
        QueryNode::Cast {
            source: Some(Box::new(source)),
            type_name: type_name.into(),
        }
    }

    /// `isof(source, T)`.
    #[must_use]
    pub fn is_of(source: QueryNode, type_name: impl Into<String>) -> Self {
        QueryNode::IsOf {
            source: Some(Box::new(source)),
            type_name: type_name.into(),
        }
    }

    /// `source/$count`.
    #[must_use]
    pub fn count(source: QueryNode) -> Self {
        QueryNode::Count {
            source: Box::new(source),
            filter: None,
        }
    }

    /// `source/$count($filter=...)`.
    #[must_use]
    pub fn count_where(source: QueryNode, filter: FilterClause) -> Self {
        QueryNode::Count {
            source: Box::new(source),
            filter: Some(Box::new(filter)),
        }
    }

    /// `item in list`.
    #[must_use]
    pub fn in_list(item: QueryNode, list: QueryNode) -> Self {
        QueryNode::In {
            item: Box::new(item),
            list: Box::new(list),
        }
    }

    /// Returns the node kind, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            QueryNode::Constant { .. } => "Constant",
            QueryNode::CollectionConstant { .. } => "CollectionConstant",
            QueryNode::BinaryOperator { .. } => "BinaryOperator",
            QueryNode::UnaryOperator { .. } => "UnaryOperator",
            QueryNode::Convert { .. } => "Convert",
            QueryNode::RangeVariable { .. } => "RangeVariable",
            QueryNode::Property { .. } => "Property",
            QueryNode::DynamicProperty { .. } => "DynamicProperty",
            QueryNode::ResourceCast { .. } => "ResourceCast",
            QueryNode::Any { .. } => "Any",
            QueryNode::All { .. } => "All",
            QueryNode::FunctionCall { .. } => "FunctionCall",
            QueryNode::Cast { .. } => "Cast",
            QueryNode::IsOf { .. } => "IsOf",
            QueryNode::Count { .. } => "Count",
            QueryNode::In { .. } => "In",
            QueryNode::ParameterAlias { .. } => "ParameterAlias",
        }
    }
}
