//! State shared by the binders of one compilation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use crate::ast::{SearchClause, IMPLICIT_RANGE_VARIABLE, THIS_RANGE_VARIABLE};
use crate::error::{OdexError, Result};
use crate::expr::{ConstantCell, Expr, ParamId};
use crate::model::Model;
use crate::settings::{NullPropagation, QuerySettings, SourceKind};
use crate::types::{TypeRef, Value};

use super::functions::FunctionRegistry;
use super::scope::{RangeScope, RangeVariable};
use super::BindError;

/// Host-supplied compiler for `$search` clauses.
pub trait SearchBinder: Send + Sync {
    /// Returns a boolean expression over the context's source element.
    ///
    /// # Errors
    ///
    /// Returns an error if the search expression cannot be compiled.
    fn bind_search(&self, search: &SearchClause, ctx: &mut BinderContext) -> Result<Expr>;
}

type ConstantCache = HashMap<(Value, TypeRef), Arc<ConstantCell>>;

/// Compilation context for one element type.
///
/// A top-level context owns the parameter counter and the constant cache;
/// nested contexts (expanded collections, aggregated navigations) share
/// both, so identical literals anywhere in one compilation map to the same
/// cell and parameter ids never collide.
pub struct BinderContext {
    model: Arc<Model>,
    settings: QuerySettings,
    source_kind: SourceKind,
    element_type: TypeRef,
    source: ParamId,
    scope: RangeScope,
    computed: HashMap<String, Expr>,
    functions: Arc<FunctionRegistry>,
    search_binder: Option<Arc<dyn SearchBinder>>,
    constants: Rc<RefCell<ConstantCache>>,
    next_param: Rc<Cell<u32>>,
}

impl BinderContext {
    /// Creates a context whose source elements have the named type (an
    /// entity, complex, enum or primitive type).
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the type is not in the model.
    pub fn new(model: Arc<Model>, element_type_name: &str) -> Result<Self> {
        let element_type = model
            .resolve_type_name(element_type_name)
            .ok_or_else(|| OdexError::SchemaError(format!("Type '{element_type_name}' not found")))?;
        Ok(Self::for_type(model, element_type.with_nullable(false)))
    }

    /// Creates a context over elements of an arbitrary static type, such
    /// as the record type produced by an aggregation.
    #[must_use]
    pub fn for_type(model: Arc<Model>, element_type: TypeRef) -> Self {
        let next_param = Rc::new(Cell::new(0));
        let source = allocate(&next_param);
        BinderContext {
            model,
            settings: QuerySettings::default(),
            source_kind: SourceKind::default(),
            scope: RangeScope::rooted(RangeVariable::new(
                IMPLICIT_RANGE_VARIABLE,
                source,
                element_type.clone(),
            )),
            element_type,
            source,
            computed: HashMap::new(),
            functions: FunctionRegistry::global(),
            search_binder: None,
            constants: Rc::new(RefCell::new(HashMap::new())),
            next_param,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: QuerySettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_source_kind(mut self, source_kind: SourceKind) -> Self {
        self.source_kind = source_kind;
        self
    }

    /// Uses a private function registry instead of the process-wide one.
    #[must_use]
    pub fn with_function_registry(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    #[must_use]
    pub fn with_search_binder(mut self, search_binder: Arc<dyn SearchBinder>) -> Self {
        self.search_binder = Some(search_binder);
        self
    }

    /// Creates a correlated context for an expanded collection of
    /// `element_type`.
    ///
    /// The expanded element is bound to `$this` while `$it` keeps referring
    /// to the root resource, so nested clauses can use the outer element.
    /// Model, settings, registry, constant cache and parameter counter are
    /// shared; computed properties are not.
    #[must_use]
    pub fn nested(&self, element_type: TypeRef) -> BinderContext {
        let source = allocate(&self.next_param);
        let root = self.scope.lookup(IMPLICIT_RANGE_VARIABLE).cloned().unwrap_or_else(|| {
            RangeVariable::new(IMPLICIT_RANGE_VARIABLE, self.source, self.element_type.clone())
        });
        let mut scope = RangeScope::rooted(root);
        scope.push_this(RangeVariable::new(THIS_RANGE_VARIABLE, source, element_type.clone()));
        self.derive(element_type, source, scope)
    }

    /// Creates an uncorrelated context whose elements replace the current
    /// source, such as aggregated results or flattened related records.
    ///
    /// Both `$it` and `$this` refer to the new element.
    #[must_use]
    pub fn rebased(&self, element_type: TypeRef) -> BinderContext {
        let source = allocate(&self.next_param);
        let mut scope = RangeScope::rooted(RangeVariable::new(
            IMPLICIT_RANGE_VARIABLE,
            source,
            element_type.clone(),
        ));
        scope.push_this(RangeVariable::new(THIS_RANGE_VARIABLE, source, element_type.clone()));
        self.derive(element_type, source, scope)
    }

    fn derive(&self, element_type: TypeRef, source: ParamId, scope: RangeScope) -> BinderContext {
        BinderContext {
            model: Arc::clone(&self.model),
            settings: self.settings.clone(),
            source_kind: self.source_kind,
            scope,
            element_type,
            source,
            computed: HashMap::new(),
            functions: Arc::clone(&self.functions),
            search_binder: self.search_binder.clone(),
            constants: Rc::clone(&self.constants),
            next_param: Rc::clone(&self.next_param),
        }
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    #[must_use]
    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    #[must_use]
    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    /// Returns the effective null-propagation mode (never `Default`).
    #[must_use]
    pub fn null_propagation(&self) -> NullPropagation {
        self.settings.null_propagation.resolve(self.source_kind)
    }

    /// Returns true when nullable accesses are guarded.
    #[must_use]
    pub fn propagates_nulls(&self) -> bool {
        self.null_propagation() == NullPropagation::Propagating
    }

    /// Static type of the source elements.
    #[must_use]
    pub fn element_type(&self) -> &TypeRef {
        &self.element_type
    }

    /// Parameter bound to the current source element (`$it`).
    #[must_use]
    pub fn source_param(&self) -> ParamId {
        self.source
    }

    /// Reference to the current source element.
    #[must_use]
    pub fn source_expr(&self) -> Expr {
        Expr::parameter(self.source, self.element_type.clone())
    }

    #[must_use]
    pub fn scope(&self) -> &RangeScope {
        &self.scope
    }

    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    #[must_use]
    pub fn search_binder(&self) -> Option<Arc<dyn SearchBinder>> {
        self.search_binder.clone()
    }

    /// Allocates a fresh parameter id.
    #[must_use]
    pub fn next_param(&self) -> ParamId {
        allocate(&self.next_param)
    }

    /// Binds `name` to a fresh parameter of `type_ref` until the returned
    /// guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateVariable` if `name` is already bound in this chain.
    pub fn enter_range(&mut self, name: &str, type_ref: TypeRef) -> Result<RangeGuard<'_>> {
        let param = self.next_param();
        self.enter_range_as(name, param, type_ref)
    }

    /// Binds `name` to an existing parameter until the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateVariable` if `name` is already bound in this chain.
    pub fn enter_range_as(
        &mut self,
        name: &str,
        param: ParamId,
        type_ref: TypeRef,
    ) -> Result<RangeGuard<'_>> {
        let depth = self.scope.depth();
        self.scope.push(RangeVariable::new(name, param, type_ref))?;
        trace!(variable = name, %param, depth, "Entering range");
        Ok(RangeGuard {
            ctx: self,
            depth,
            param,
        })
    }

    /// Resolves a range variable.
    ///
    /// # Errors
    ///
    /// Returns `UndefinedVariable` if the name is not bound.
    pub fn resolve_range(&self, name: &str) -> Result<Expr> {
        self.scope
            .lookup(name)
            .map(|v| Expr::parameter(v.param, v.type_ref.clone()))
            .ok_or_else(|| BindError::UndefinedVariable(name.to_string()).into())
    }

    /// Reference to the innermost range variable (the implicit operand of
    /// single-argument `cast` and `isof`).
    #[must_use]
    pub fn innermost_range(&self) -> Expr {
        self.scope
            .innermost()
            .map_or_else(|| self.source_expr(), |v| Expr::parameter(v.param, v.type_ref.clone()))
    }

    /// Returns the expression of a computed property.
    #[must_use]
    pub fn computed(&self, name: &str) -> Option<&Expr> {
        self.computed.get(name)
    }

    /// Makes `alias` resolvable as a property of `$it`.
    pub fn add_computed(&mut self, alias: impl Into<String>, expr: Expr) {
        self.computed.insert(alias.into(), expr);
    }

    /// Returns the shared cell for a literal, creating it on first use.
    #[must_use]
    pub fn constant_cell(&self, value: Value, type_ref: TypeRef) -> Arc<ConstantCell> {
        let mut cache = self.constants.borrow_mut();
        let cell = cache
            .entry((value.clone(), type_ref.clone()))
            .or_insert_with(|| {
                trace!(%type_ref, "Hoisting constant");
                Arc::new(ConstantCell::new(value, type_ref))
            });
        Arc::clone(cell)
    }

    /// Number of distinct hoisted constants.
    #[must_use]
    pub fn constant_count(&self) -> usize {
        self.constants.borrow().len()
    }
}

impl fmt::Debug for BinderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinderContext")
            .field("element_type", &self.element_type)
            .field("source", &self.source)
            .field("scope", &self.scope)
            .field("settings", &self.settings)
            .field("source_kind", &self.source_kind)
            .finish_non_exhaustive()
    }
}

fn allocate(counter: &Cell<u32>) -> ParamId {
    let id = counter.get();
    counter.set(id + 1);
    ParamId(id)
}

/// Keeps a range variable in scope; pops it on drop.
///
/// Dereferences to the context, so binding continues through the guard.
pub struct RangeGuard<'a> {
    ctx: &'a mut BinderContext,
    depth: usize,
    param: ParamId,
}

impl RangeGuard<'_> {
    /// Parameter bound to the variable.
    #[must_use]
    pub fn param(&self) -> ParamId {
        self.param
    }
}

impl Deref for RangeGuard<'_> {
    type Target = BinderContext;

    fn deref(&self) -> &BinderContext {
        self.ctx
    }
}

impl DerefMut for RangeGuard<'_> {
    fn deref_mut(&mut self) -> &mut BinderContext {
        self.ctx
    }
}

impl Drop for RangeGuard<'_> {
    fn drop(&mut self) {
        trace!(depth = self.depth, "Leaving range");
        self.ctx.scope.truncate(self.depth);
    }
}
