//! Clause-level AST: filter, ordering, compute, search, select/expand and
//! aggregation transformations.

use super::node::{QueryNode, IMPLICIT_RANGE_VARIABLE};

/// A `$filter` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub expression: QueryNode,
    /// Name of the range variable the expression refers to (`$it` or `$this`).
    pub range_variable: String,
}

impl FilterClause {
    /// Creates a filter over the implicit range variable.
    #[must_use]
    pub fn new(expression: QueryNode) -> Self {
        FilterClause {
            expression,
            range_variable: IMPLICIT_RANGE_VARIABLE.to_string(),
        }
    }

    /// Creates a filter whose element is referred to by `range_variable`.
    #[must_use]
    pub fn with_range_variable(expression: QueryNode, range_variable: impl Into<String>) -> Self {
        FilterClause {
            expression,
            range_variable: range_variable.into(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderByDirection {
    #[default]
    Ascending,
    Descending,
}

/// One link of an `$orderby` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    pub expression: QueryNode,
    pub direction: OrderByDirection,
    pub range_variable: String,
    pub then_by: Option<Box<OrderByClause>>,
}

impl OrderByClause {
    #[must_use]
    pub fn new(expression: QueryNode, direction: OrderByDirection) -> Self {
        OrderByClause {
            expression,
            direction,
            range_variable: IMPLICIT_RANGE_VARIABLE.to_string(),
            then_by: None,
        }
    }

    /// Ascending ordering on `expression`.
    #[must_use]
    pub fn asc(expression: QueryNode) -> Self {
        Self::new(expression, OrderByDirection::Ascending)
    }

    /// Descending ordering on `expression`.
    #[must_use]
    pub fn desc(expression: QueryNode) -> Self {
        Self::new(expression, OrderByDirection::Descending)
    }

    /// Appends `next` to the end of the chain.
    #[must_use]
    pub fn then(mut self, next: OrderByClause) -> Self {
        let tail = match self.then_by.take() {
            Some(link) => (*link).then(next),
            None => next,
        };
        self.then_by = Some(Box::new(tail));
        self
    }
}

/// One `$compute` item: `expression as alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeExpression {
    pub expression: QueryNode,
    pub alias: String,
}

/// A `$compute` clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComputeClause {
    pub items: Vec<ComputeExpression>,
}

impl ComputeClause {
    /// Adds an item.
    #[must_use]
    pub fn with(mut self, expression: QueryNode, alias: impl Into<String>) -> Self {
        self.items.push(ComputeExpression {
            expression,
            alias: alias.into(),
        });
        self
    }
}

/// `$search` expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchNode {
    Term(String),
    And(Box<SearchNode>, Box<SearchNode>),
    Or(Box<SearchNode>, Box<SearchNode>),
    Not(Box<SearchNode>),
}

/// A `$search` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchClause {
    pub expression: SearchNode,
}

impl SearchClause {
    /// Search for a single term.
    #[must_use]
    pub fn term(term: impl Into<String>) -> Self {
        SearchClause {
            expression: SearchNode::Term(term.into()),
        }
    }
}

/// One segment of a select or expand path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Declared structural or navigation property.
    Property(String),
    /// Type segment narrowing to a derived type.
    Type(String),
    /// Open-type property.
    Dynamic(String),
}

/// `$select=Path` (optionally with a nested selection for complex values).
#[derive(Debug, Clone, PartialEq)]
pub struct PathSelectItem {
    pub path: Vec<PathSegment>,
    pub select: Option<SelectExpandClause>,
}

/// Options nested inside `$expand=Nav(...)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpandOptions {
    pub filter: Option<FilterClause>,
    pub order_by: Option<OrderByClause>,
    pub compute: Option<ComputeClause>,
    pub select_expand: Option<SelectExpandClause>,
    pub search: Option<SearchClause>,
    pub top: Option<usize>,
    pub skip: Option<usize>,
    pub count: bool,
}

/// `$expand=Path(options)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandItem {
    pub path: Vec<PathSegment>,
    pub options: ExpandOptions,
}

/// One item of a select/expand tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `$select=*`.
    Wildcard,
    Path(PathSelectItem),
    Expand(ExpandItem),
    /// `$expand=Nav/$ref`.
    Reference(ExpandItem),
}

/// A `$select`/`$expand` tree for one nesting level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectExpandClause {
    pub items: Vec<SelectItem>,
}

impl SelectExpandClause {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `$select=*`.
    #[must_use]
    pub fn select_all(mut self) -> Self {
        self.items.push(SelectItem::Wildcard);
        self
    }

    /// Selects a top-level property.
    #[must_use]
    pub fn select(mut self, name: impl Into<String>) -> Self {
        self.items.push(SelectItem::Path(PathSelectItem {
            path: vec![PathSegment::Property(name.into())],
            select: None,
        }));
        self
    }

    /// Selects a property path.
    #[must_use]
    pub fn select_path(mut self, path: Vec<PathSegment>) -> Self {
        self.items.push(SelectItem::Path(PathSelectItem { path, select: None }));
        self
    }

    /// Selects a complex property with a nested selection.
    #[must_use]
    pub fn select_nested(mut self, name: impl Into<String>, select: SelectExpandClause) -> Self {
        self.items.push(SelectItem::Path(PathSelectItem {
            path: vec![PathSegment::Property(name.into())],
            select: Some(select),
        }));
        self
    }

    /// Expands a navigation property without options.
    #[must_use]
    pub fn expand(self, name: impl Into<String>) -> Self {
        self.expand_with(name, ExpandOptions::default())
    }

    /// Expands a navigation property with nested options.
    #[must_use]
    pub fn expand_with(mut self, name: impl Into<String>, options: ExpandOptions) -> Self {
        self.items.push(SelectItem::Expand(ExpandItem {
            path: vec![PathSegment::Property(name.into())],
            options,
        }));
        self
    }

    /// Expands a navigation property as references only.
    #[must_use]
    pub fn expand_ref(mut self, name: impl Into<String>) -> Self {
        self.items.push(SelectItem::Reference(ExpandItem {
            path: vec![PathSegment::Property(name.into())],
            options: ExpandOptions::default(),
        }));
        self
    }

    /// Returns true when no item restricts the selection (wildcard present
    /// or no path items at all).
    #[must_use]
    pub fn all_selected(&self) -> bool {
        self.items.iter().any(|i| matches!(i, SelectItem::Wildcard))
            || !self.items.iter().any(|i| matches!(i, SelectItem::Path(_)))
    }
}

/// One node of a `groupby` property tree.
///
/// Inner nodes name a navigation level; leaves carry the full path
/// expression from the grouped element.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupByPropertyNode {
    pub name: String,
    pub expression: Option<QueryNode>,
    pub children: Vec<GroupByPropertyNode>,
}

impl GroupByPropertyNode {
    /// Leaf grouping on `expression`.
    #[must_use]
    pub fn leaf(name: impl Into<String>, expression: QueryNode) -> Self {
        GroupByPropertyNode {
            name: name.into(),
            expression: Some(expression),
            children: Vec::new(),
        }
    }

    /// Navigation level containing nested grouping properties.
    #[must_use]
    pub fn level(name: impl Into<String>, children: Vec<GroupByPropertyNode>) -> Self {
        GroupByPropertyNode {
            name: name.into(),
            expression: None,
            children,
        }
    }
}

/// `groupby((...))` transformation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupByClause {
    pub properties: Vec<GroupByPropertyNode>,
}

/// Aggregation methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationMethod {
    Sum,
    Min,
    Max,
    Average,
    CountDistinct,
}

/// One aggregate application.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateExpression {
    /// `expression with method as alias`.
    Property {
        expression: QueryNode,
        method: AggregationMethod,
        alias: String,
    },
    /// `$count as alias`.
    Count { alias: String },
    /// `Nav($filter=...)/aggregate(children) as alias` over a collection
    /// navigation; children are relative to the related element.
    Collection {
        navigation: String,
        filter: Option<FilterClause>,
        children: Vec<AggregateExpression>,
        alias: String,
    },
}

impl AggregateExpression {
    #[must_use]
    pub fn property(expression: QueryNode, method: AggregationMethod, alias: impl Into<String>) -> Self {
        AggregateExpression::Property {
            expression,
            method,
            alias: alias.into(),
        }
    }

    #[must_use]
    pub fn count(alias: impl Into<String>) -> Self {
        AggregateExpression::Count {
            alias: alias.into(),
        }
    }

    /// Returns the output name.
    #[must_use]
    pub fn alias(&self) -> &str {
        match self {
            AggregateExpression::Property { alias, .. }
            | AggregateExpression::Count { alias }
            | AggregateExpression::Collection { alias, .. } => alias,
        }
    }
}

/// `aggregate(...)` transformation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateClause {
    pub expressions: Vec<AggregateExpression>,
}
