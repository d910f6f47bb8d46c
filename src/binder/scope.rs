//! Range-variable scope for name resolution during binding.

use crate::ast::THIS_RANGE_VARIABLE;
use crate::expr::ParamId;
use crate::types::TypeRef;

use super::BindError;

/// Stack of range variables visible at the current nesting depth.
///
/// Names are unique along one nesting chain; sibling quantifiers may reuse
/// a name because the first one is popped before the second is pushed.
#[derive(Debug, Clone, Default)]
pub struct RangeScope {
    variables: Vec<RangeVariable>,
}

impl RangeScope {
    /// Creates a new empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope holding only the implicit variable.
    #[must_use]
    pub fn rooted(variable: RangeVariable) -> Self {
        RangeScope {
            variables: vec![variable],
        }
    }

    /// Pushes a variable.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateVariable` if the name is already bound in this
    /// chain (`$this` may be shadowed by nested counts).
    pub fn push(&mut self, variable: RangeVariable) -> Result<(), BindError> {
        if variable.name != THIS_RANGE_VARIABLE && self.contains(&variable.name) {
            return Err(BindError::DuplicateVariable(variable.name));
        }
        self.variables.push(variable);
        Ok(())
    }

    /// Pushes a `$this` variable, which may shadow an outer one.
    pub(crate) fn push_this(&mut self, variable: RangeVariable) {
        debug_assert_eq!(variable.name, THIS_RANGE_VARIABLE);
        self.variables.push(variable);
    }

    /// Pops variables until `depth` remain.
    pub fn truncate(&mut self, depth: usize) {
        self.variables.truncate(depth);
    }

    /// Looks up the innermost variable with the given name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&RangeVariable> {
        self.variables.iter().rev().find(|v| v.name == name)
    }

    /// Returns true if a variable with the given name is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Returns the innermost variable.
    #[must_use]
    pub fn innermost(&self) -> Option<&RangeVariable> {
        self.variables.last()
    }

    /// Number of bound variables.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.variables.len()
    }

    /// Returns all variable names, outermost first.
    #[must_use]
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }
}

/// A named lambda parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeVariable {
    pub name: String,
    pub param: ParamId,
    pub type_ref: TypeRef,
}

impl RangeVariable {
    #[must_use]
    pub fn new(name: impl Into<String>, param: ParamId, type_ref: TypeRef) -> Self {
        RangeVariable {
            name: name.into(),
            param,
            type_ref,
        }
    }
}
