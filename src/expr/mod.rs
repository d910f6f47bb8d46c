//! Compiled expression trees.
//!
//! Binders lower query AST into [`Expr`] trees over lambda parameters. A
//! tree is immutable, `Send + Sync`, and can be evaluated in memory with
//! [`Lambda::invoke`] or walked by a remote provider.

mod eval;
mod functions;
mod render;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::model::EnumType;
use crate::types::{BagShape, PrimitiveKind, TypeKind, TypeRef, Value};

pub use eval::Env;
pub use functions::BuiltinFunction;

/// Identifier of a lambda parameter, unique within one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u32);

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$p{}", self.0)
    }
}

/// Shared indirection cell holding a hoisted constant.
///
/// Identical literals compiled in one context share one cell, so a plan
/// cache can key on [`Expr::plan_key`] and rebind cell contents.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantCell {
    value: Value,
    type_ref: TypeRef,
}

impl ConstantCell {
    #[must_use]
    pub fn new(value: Value, type_ref: TypeRef) -> Self {
        ConstantCell { value, type_ref }
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }
}

/// Signature of a host-provided function body.
pub type HostFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A named host function registered as a custom query function.
#[derive(Clone)]
pub struct HostFunction {
    name: String,
    func: Arc<HostFn>,
}

impl HostFunction {
    #[must_use]
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        HostFunction {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the function.
    ///
    /// # Errors
    ///
    /// Returns whatever error the host function raises.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction").field("name", &self.name).finish()
    }
}

/// Binary operators of the compiled tree. Logical operators are
/// [`Expr::AndAlso`] and [`Expr::OrElse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Has,
}

impl BinaryOp {
    /// Returns the string representation of this operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Has => "has",
        }
    }

    /// Returns true for relational and equality operators.
    #[must_use]
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
        )
    }
}

/// Aggregate methods understood by [`Expr::Aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateMethod {
    Sum,
    Min,
    Max,
    Average,
    CountDistinct,
    /// Number of elements (no selector).
    Count,
}

impl AggregateMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateMethod::Sum => "Sum",
            AggregateMethod::Min => "Min",
            AggregateMethod::Max => "Max",
            AggregateMethod::Average => "Average",
            AggregateMethod::CountDistinct => "CountDistinct",
            AggregateMethod::Count => "Count",
        }
    }
}

/// One key of an ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub selector: Lambda,
    pub descending: bool,
}

/// Set of runtime type names accepted by a type test (the target and its
/// derived types).
pub type TypeSet = Arc<BTreeSet<String>>;

/// A compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Inlined constant.
    Constant { value: Value, type_ref: TypeRef },
    /// Constant hoisted into a shared cell.
    Parameterized(Arc<ConstantCell>),
    /// Reference to a lambda or let parameter.
    Parameter { id: ParamId, type_ref: TypeRef },
    /// Declared property of a resource, or named slot of a record.
    Property {
        source: Box<Expr>,
        name: String,
        type_ref: TypeRef,
    },
    /// Dynamic-dictionary lookup; null when the dictionary is absent or
    /// lacks the key.
    DynamicProperty { source: Box<Expr>, name: String },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        type_ref: TypeRef,
    },
    /// Short-circuit three-valued AND.
    AndAlso(Box<Expr>, Box<Expr>),
    /// Short-circuit three-valued OR.
    OrElse(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
        type_ref: TypeRef,
    },
    IsNull(Box<Expr>),
    /// True only when the operand is `true` (null and false map to false).
    IsTrue(Box<Expr>),
    /// Value conversion inserted by promotion; fails when undefined.
    Convert {
        operand: Box<Expr>,
        target: TypeRef,
        members: Option<Arc<EnumType>>,
    },
    /// Value conversion from an explicit cast; null when undefined.
    TryConvert {
        operand: Box<Expr>,
        target: TypeRef,
        members: Option<Arc<EnumType>>,
    },
    /// Runtime type test.
    TypeIs {
        operand: Box<Expr>,
        type_name: String,
        accepted: TypeSet,
    },
    /// Runtime narrowing; null on mismatch.
    TypeAs {
        operand: Box<Expr>,
        type_name: String,
        accepted: TypeSet,
        type_ref: TypeRef,
    },
    Call {
        function: BuiltinFunction,
        args: Vec<Expr>,
        type_ref: TypeRef,
    },
    Invoke {
        function: HostFunction,
        args: Vec<Expr>,
        type_ref: TypeRef,
    },
    /// Membership of `item` in the collection `list`.
    In { item: Box<Expr>, list: Box<Expr> },
    Any {
        source: Box<Expr>,
        predicate: Option<Lambda>,
    },
    All { source: Box<Expr>, predicate: Lambda },
    Count(Box<Expr>),
    Where { source: Box<Expr>, predicate: Lambda },
    OfType {
        source: Box<Expr>,
        type_name: String,
        accepted: TypeSet,
    },
    /// Stable ordering by the keys, first key most significant.
    OrderBy { source: Box<Expr>, keys: Vec<SortKey> },
    Skip { source: Box<Expr>, count: usize },
    Take { source: Box<Expr>, count: usize },
    Select { source: Box<Expr>, selector: Lambda },
    /// Flattening projection.
    SelectMany { source: Box<Expr>, selector: Lambda },
    /// Materializes a correlated sequence once per evaluation.
    Buffer(Box<Expr>),
    /// Binds `value` to `param` while evaluating `body`.
    Let {
        param: ParamId,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// Builds a property bag; `slots` align with `shape.slots`.
    MakeBag {
        shape: Arc<BagShape>,
        instance: Option<Box<Expr>>,
        slots: Vec<Expr>,
    },
    /// Partitions a collection by key, in first-seen key order.
    GroupBy { source: Box<Expr>, key: Lambda },
    /// Key of a partition.
    GroupKey(Box<Expr>),
    /// Elements of a partition.
    GroupElements(Box<Expr>),
    /// Pairs a key bag with an aggregate bag.
    MakeGroupResult {
        key: Box<Expr>,
        aggregates: Box<Expr>,
        shape: Arc<BagShape>,
    },
    Aggregate {
        source: Box<Expr>,
        method: AggregateMethod,
        selector: Option<Lambda>,
        type_ref: TypeRef,
    },
}

impl Expr {
    /// Inlined constant.
    #[must_use]
    pub fn constant(value: Value, type_ref: TypeRef) -> Self {
        Expr::Constant { value, type_ref }
    }

    /// Typed null.
    #[must_use]
    pub fn null(type_ref: &TypeRef) -> Self {
        Expr::Constant {
            value: Value::Null,
            type_ref: type_ref.as_nullable(),
        }
    }

    /// Boolean literal.
    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Expr::Constant {
            value: Value::Boolean(value),
            type_ref: TypeRef::boolean(),
        }
    }

    #[must_use]
    pub fn parameter(id: ParamId, type_ref: TypeRef) -> Self {
        Expr::Parameter { id, type_ref }
    }

    #[must_use]
    pub fn property(source: Expr, name: impl Into<String>, type_ref: TypeRef) -> Self {
        Expr::Property {
            source: Box::new(source),
            name: name.into(),
            type_ref,
        }
    }

    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr, type_ref: TypeRef) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            type_ref,
        }
    }

    #[must_use]
    pub fn and_also(left: Expr, right: Expr) -> Self {
        Expr::AndAlso(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn or_else(left: Expr, right: Expr) -> Self {
        Expr::OrElse(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn is_null(operand: Expr) -> Self {
        Expr::IsNull(Box::new(operand))
    }

    /// `test ? if_true : if_false`, typed as `if_true`.
    #[must_use]
    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        let type_ref = if_true.type_ref();
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            type_ref,
        }
    }

    /// Returns true for a constant or parameterized null literal.
    #[must_use]
    pub fn is_null_constant(&self) -> bool {
        match self {
            Expr::Constant { value, .. } => value.is_null(),
            Expr::Parameterized(cell) => cell.value().is_null(),
            _ => false,
        }
    }

    /// Returns the literal value of a constant node.
    #[must_use]
    pub fn constant_value(&self) -> Option<&Value> {
        match self {
            Expr::Constant { value, .. } => Some(value),
            Expr::Parameterized(cell) => Some(cell.value()),
            _ => None,
        }
    }

    /// Returns the static result type.
    #[must_use]
    pub fn type_ref(&self) -> TypeRef {
        match self {
            Expr::Constant { type_ref, .. }
            | Expr::Parameter { type_ref, .. }
            | Expr::Property { type_ref, .. }
            | Expr::Binary { type_ref, .. }
            | Expr::Conditional { type_ref, .. }
            | Expr::TypeAs { type_ref, .. }
            | Expr::Call { type_ref, .. }
            | Expr::Invoke { type_ref, .. }
            | Expr::Aggregate { type_ref, .. } => type_ref.clone(),
            Expr::Parameterized(cell) => cell.type_ref().clone(),
            Expr::DynamicProperty { .. } | Expr::GroupKey(_) => TypeRef::untyped(),
            Expr::AndAlso(left, right) | Expr::OrElse(left, right) => {
                let nullable = left.type_ref().nullable || right.type_ref().nullable;
                TypeRef::boolean().with_nullable(nullable)
            }
            Expr::Not(operand) => TypeRef::boolean().with_nullable(operand.type_ref().nullable),
            Expr::Negate(operand) | Expr::Buffer(operand) => operand.type_ref(),
            Expr::IsNull(_)
            | Expr::IsTrue(_)
            | Expr::TypeIs { .. }
            | Expr::In { .. }
            | Expr::Any { .. }
            | Expr::All { .. } => TypeRef::boolean(),
            Expr::Convert {
                operand, target, ..
            } => target.with_nullable(target.nullable || operand.type_ref().nullable),
            Expr::TryConvert { target, .. } => target.as_nullable(),
            Expr::Count(_) => TypeRef::int64(),
            Expr::Where { source, .. }
            | Expr::OrderBy { source, .. }
            | Expr::Skip { source, .. }
            | Expr::Take { source, .. } => source.type_ref(),
            Expr::OfType { type_name, .. } => {
                TypeRef::collection(TypeRef::new(TypeKind::Entity(type_name.clone()), false))
            }
            Expr::Select { selector, .. } => TypeRef::collection(selector.return_type()),
            Expr::SelectMany { selector, .. } => selector
                .return_type()
                .element_type()
                .cloned()
                .map_or_else(|| TypeRef::collection(TypeRef::untyped()), TypeRef::collection),
            Expr::Let { body, .. } => body.type_ref(),
            Expr::MakeBag { shape, .. } | Expr::MakeGroupResult { shape, .. } => {
                TypeRef::record(Arc::clone(shape))
            }
            Expr::GroupBy { .. } => TypeRef::collection(TypeRef::untyped()),
            Expr::GroupElements(source) => source.type_ref(),
        }
    }

    /// Returns the primitive kind of the static type, if primitive.
    #[must_use]
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        self.type_ref().primitive_kind()
    }

    /// Evaluates the expression with no parameters bound.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error (null reference, overflow, ...).
    pub fn evaluate(&self) -> Result<Value> {
        self.evaluate_in(&mut Env::new())
    }

    /// Renders the tree with parameterized constants replaced by ordinal
    /// placeholders (`@p0`, `@p1`, ...) in order of first appearance.
    #[must_use]
    pub fn plan_key(&self) -> String {
        render::render(self, true)
    }

    /// Returns the parameters referenced but not bound inside the tree.
    #[must_use]
    pub fn free_parameters(&self) -> BTreeSet<ParamId> {
        let mut free = BTreeSet::new();
        render::collect_free(self, &mut Vec::new(), &mut free);
        free
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render::render(self, false))
    }
}

/// A one-parameter function.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub param: ParamId,
    pub param_type: TypeRef,
    pub body: Box<Expr>,
}

impl Lambda {
    #[must_use]
    pub fn new(param: ParamId, param_type: TypeRef, body: Expr) -> Self {
        Lambda {
            param,
            param_type,
            body: Box::new(body),
        }
    }

    /// Returns the type of the body.
    #[must_use]
    pub fn return_type(&self) -> TypeRef {
        self.body.type_ref()
    }

    /// Returns true when the body references no parameter other than the
    /// lambda's own.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.body
            .free_parameters()
            .iter()
            .all(|id| *id == self.param)
    }

    /// Calls the lambda with `arg`.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error raised by the body.
    pub fn invoke(&self, arg: &Value) -> Result<Value> {
        self.call(&mut Env::new(), arg.clone())
    }

    /// Calls a predicate lambda; anything but `true` is false.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error raised by the body.
    pub fn test(&self, arg: &Value) -> Result<bool> {
        Ok(matches!(self.invoke(arg)?, Value::Boolean(true)))
    }

    /// Inlines the lambda over `argument`.
    #[must_use]
    pub fn apply(&self, argument: Expr) -> Expr {
        Expr::Let {
            param: self.param,
            value: Box::new(argument),
            body: self.body.clone(),
        }
    }

    /// Renders the lambda with placeholders for parameterized constants.
    #[must_use]
    pub fn plan_key(&self) -> String {
        render::render_lambda(self, true)
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render::render_lambda(self, false))
    }
}
