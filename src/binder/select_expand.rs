//! Select/expand binder.
//!
//! Compiles a selection tree into a projector producing one property bag
//! per source element. Partial selections carry only the selected slots
//! plus automatically selected keys and concurrency tokens; full
//! selections carry the source instance. Expanded collections become
//! nested pipelines (compute, filter, search, count, order, skip, take,
//! project).

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::ast::{
    ExpandItem, ExpandOptions, PathSegment, PathSelectItem, SelectExpandClause, SelectItem,
};
use crate::error::Result;
use crate::expr::{Expr, Lambda, SortKey};
use crate::model::{Member, StructuredKind};
use crate::types::{BagShape, SlotKind, SlotShape, TypeRef};

use super::base::guard_null;
use super::context::BinderContext;
use super::filter::{bind_filter, predicate};
use super::orderby::bind_order_by;
use super::BindError;

/// Compiled projection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpandBinderResult {
    /// Maps one source element to a property bag.
    pub projector: Lambda,
    /// Slot layout of the produced bags.
    pub shape: Arc<BagShape>,
}

impl SelectExpandBinderResult {
    /// Wraps `source` (a collection) in the projection.
    #[must_use]
    pub fn apply_to(&self, source: Expr) -> Expr {
        Expr::Select {
            source: Box::new(source),
            selector: self.projector.clone(),
        }
    }
}

/// Compiles a select/expand tree over the context's source element.
///
/// # Errors
///
/// Returns `ArgumentNull` when the clause is absent, `PropertyNotFound`
/// for unknown properties on closed types, `InvalidCast` for type segments
/// naming unrelated types, or any error raised by nested clauses.
pub fn bind_select_expand(
    select_expand: Option<&SelectExpandClause>,
    ctx: &mut BinderContext,
) -> Result<SelectExpandBinderResult> {
    let clause = select_expand.ok_or_else(|| BindError::ArgumentNull("selectexpand".into()))?;
    let element_type = ctx.element_type().clone();
    let type_name = element_type
        .structured_name()
        .ok_or_else(|| BindError::UnsupportedNode(format!("select/expand over {element_type}")))?
        .to_string();
    debug!(element_type = %element_type, items = clause.items.len(), "Binding select/expand");

    let source = ctx.source_expr();
    let (body, shape) = bind_level(clause, source, &type_name, ctx)?;
    Ok(SelectExpandBinderResult {
        projector: Lambda::new(ctx.source_param(), element_type, body),
        shape,
    })
}

/// Slots of one bag under construction.
#[derive(Default)]
struct Level {
    slots: Vec<SlotShape>,
    values: Vec<Expr>,
}

impl Level {
    fn push(&mut self, slot: SlotShape, value: Expr) {
        self.slots.push(slot);
        self.values.push(value);
    }

    fn contains(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name == name)
    }

    fn finish(self, instance: Option<Expr>) -> (Expr, Arc<BagShape>) {
        let shape = Arc::new(BagShape {
            slots: self.slots,
            instance_type: instance.as_ref().map(Expr::type_ref),
        });
        let bag = Expr::MakeBag {
            shape: Arc::clone(&shape),
            instance: instance.map(Box::new),
            slots: self.values,
        };
        (bag, shape)
    }
}

fn bind_level(
    clause: &SelectExpandClause,
    source: Expr,
    type_name: &str,
    ctx: &mut BinderContext,
) -> Result<(Expr, Arc<BagShape>)> {
    let mut level = Level::default();
    let all_selected = clause.all_selected();

    if !all_selected {
        for item in merge_paths(clause) {
            bind_selected_path(&item, &source, type_name, ctx, &mut level)?;
        }
        auto_select(&source, type_name, ctx, &mut level)?;
    }

    for item in &clause.items {
        match item {
            SelectItem::Expand(expand) => bind_expand(expand, false, &source, type_name, ctx, &mut level)?,
            SelectItem::Reference(expand) => bind_expand(expand, true, &source, type_name, ctx, &mut level)?,
            SelectItem::Wildcard | SelectItem::Path(_) => {}
        }
    }

    Ok(level.finish(all_selected.then_some(source)))
}

/// Folds multi-segment property paths (`Address/City`, `Address/Zip`)
/// into one nested selection per leading complex property, keeping
/// first-seen order and dropping duplicates.
fn merge_paths(clause: &SelectExpandClause) -> Vec<PathSelectItem> {
    let mut merged: IndexMap<Vec<PathSegment>, PathSelectItem> = IndexMap::new();
    for item in &clause.items {
        let SelectItem::Path(item) = item else {
            continue;
        };
        match item.path.as_slice() {
            [PathSegment::Property(head), rest @ ..] if !rest.is_empty() => {
                let key = vec![PathSegment::Property(head.clone())];
                let entry = merged.entry(key.clone()).or_insert_with(|| PathSelectItem {
                    path: key,
                    select: Some(SelectExpandClause::new()),
                });
                if let Some(nested) = &mut entry.select {
                    nested.items.push(SelectItem::Path(PathSelectItem {
                        path: rest.to_vec(),
                        select: item.select.clone(),
                    }));
                }
            }
            _ => {
                merged.entry(item.path.clone()).or_insert_with(|| item.clone());
            }
        }
    }
    merged.into_values().collect()
}

fn bind_selected_path(
    item: &PathSelectItem,
    source: &Expr,
    type_name: &str,
    ctx: &mut BinderContext,
    level: &mut Level,
) -> Result<()> {
    match item.path.as_slice() {
        [] => Ok(()),
        [PathSegment::Type(derived), rest @ ..] => {
            let narrowed = ctx.bind_cast(source.clone(), derived)?;
            let inner = PathSelectItem {
                path: rest.to_vec(),
                select: item.select.clone(),
            };
            let mut derived_level = Level::default();
            bind_selected_path(&inner, &narrowed, derived, ctx, &mut derived_level)?;
            // a mismatching instance yields typed nulls, whatever the mode
            for (slot, value) in derived_level.slots.into_iter().zip(derived_level.values) {
                if level.contains(&slot.name) {
                    continue;
                }
                let type_ref = slot.type_ref.as_nullable();
                level.push(
                    SlotShape::new(slot.name, type_ref, slot.kind),
                    guard_null(&narrowed, value),
                );
            }
            Ok(())
        }
        [PathSegment::Dynamic(name)] => {
            if !level.contains(name) {
                let value = ctx.bind_dynamic_property(source.clone(), name)?;
                level.push(SlotShape::new(name.clone(), value.type_ref(), SlotKind::Dynamic), value);
            }
            Ok(())
        }
        [PathSegment::Property(name)] => {
            if level.contains(name) {
                return Ok(());
            }
            let is_source = matches!(source, Expr::Parameter { id, .. } if *id == ctx.source_param());
            if let Some(computed) = ctx.computed(name).filter(|_| is_source).cloned() {
                level.push(
                    SlotShape::new(name.clone(), computed.type_ref(), SlotKind::Computed),
                    computed,
                );
                return Ok(());
            }
            let member = ctx.model().find_member(type_name, name).map(|m| match m {
                Member::Structural(p) => Some(p.type_ref.clone()),
                Member::Navigation(_) => None,
            });
            match member {
                Some(Some(declared)) => {
                    let value = ctx.bind_property_access(source.clone(), name)?;
                    match (&item.select, declared.structured_name()) {
                        (Some(nested), Some(complex)) => {
                            let complex = complex.to_string();
                            let (bag, shape) = bind_level(nested, value.clone(), &complex, ctx)?;
                            let record = TypeRef::record(shape).as_nullable();
                            level.push(
                                SlotShape::new(name.clone(), record, SlotKind::Selected),
                                guard_null(&value, bag),
                            );
                        }
                        _ => level.push(
                            SlotShape::new(name.clone(), value.type_ref(), SlotKind::Selected),
                            value,
                        ),
                    }
                    Ok(())
                }
                Some(None) => {
                    debug!(property = %name, "Navigation property selected without expansion");
                    Ok(())
                }
                None if ctx.model().is_open(type_name) => {
                    let value = ctx.bind_dynamic_property(source.clone(), name)?;
                    level.push(SlotShape::new(name.clone(), value.type_ref(), SlotKind::Dynamic), value);
                    Ok(())
                }
                None => Err(BindError::PropertyNotFound {
                    type_name: type_name.to_string(),
                    property: name.clone(),
                }
                .into()),
            }
        }
        path => Err(BindError::UnsupportedNode(format!("select path {path:?}")).into()),
    }
}

/// Adds key and concurrency-token properties missing from a partial
/// selection of an entity.
fn auto_select(source: &Expr, type_name: &str, ctx: &BinderContext, level: &mut Level) -> Result<()> {
    let is_entity = ctx
        .model()
        .structured_type(type_name)
        .is_some_and(|t| t.kind == StructuredKind::Entity);
    if !is_entity {
        return Ok(());
    }
    let mut names = ctx.model().key_properties(type_name);
    names.extend(ctx.model().concurrency_tokens(type_name));
    for name in names {
        if level.contains(&name) {
            continue;
        }
        let value = ctx.bind_property_access(source.clone(), &name)?;
        level.push(SlotShape::new(name, value.type_ref(), SlotKind::AutoSelected), value);
    }
    Ok(())
}

fn bind_expand(
    item: &ExpandItem,
    reference: bool,
    source: &Expr,
    type_name: &str,
    ctx: &mut BinderContext,
    level: &mut Level,
) -> Result<()> {
    let (last, prefix) = item
        .path
        .split_last()
        .ok_or_else(|| BindError::UnsupportedNode("empty expand path".into()))?;
    let mut owner = source.clone();
    let mut owner_type = type_name.to_string();
    for segment in prefix {
        match segment {
            PathSegment::Type(derived) => {
                owner = ctx.bind_cast(owner, derived)?;
                owner_type.clone_from(derived);
            }
            other => {
                return Err(BindError::UnsupportedNode(format!("expand path segment {other:?}")).into());
            }
        }
    }
    let PathSegment::Property(name) = last else {
        return Err(BindError::UnsupportedNode(format!("expand path segment {last:?}")).into());
    };
    let navigation = match ctx.model().find_member(&owner_type, name) {
        Some(Member::Navigation(navigation)) => navigation.clone(),
        Some(Member::Structural(_)) => {
            return Err(BindError::UnsupportedNode(format!("'{name}' is not a navigation property")).into());
        }
        None => {
            return Err(BindError::PropertyNotFound {
                type_name: owner_type,
                property: name.clone(),
            }
            .into());
        }
    };
    debug!(
        navigation = %name,
        collection = navigation.is_collection,
        reference,
        "Binding expansion"
    );

    let narrowed = !prefix.is_empty();
    let nav_value = Expr::property(owner.clone(), name.clone(), navigation.type_ref());
    let target = TypeRef::entity(navigation.target_type.clone());
    let mut nested = ctx.nested(target);

    if navigation.is_collection {
        let expansion = expand_collection(&nav_value, &item.options, reference, &mut nested)?;
        let count_slot = format!("{name}/$count");
        let value = ctx.apply_null_propagation(&nav_value, expansion.value);
        let value = if narrowed { guard_null(&owner, value) } else { value };
        level.push(
            SlotShape::new(name.clone(), expansion.type_ref, SlotKind::Expanded),
            value,
        );
        if let Some(count) = expansion.count {
            let count = ctx.apply_null_propagation(&nav_value, count);
            let count = if narrowed { guard_null(&owner, count) } else { count };
            level.push(
                SlotShape::new(count_slot, count.type_ref(), SlotKind::NestedCount),
                count,
            );
        }
    } else {
        let (value, type_ref) = expand_single(nav_value, name, &item.options, reference, &mut nested)?;
        let value = if narrowed { guard_null(&owner, value) } else { value };
        level.push(SlotShape::new(name.clone(), type_ref, SlotKind::Expanded), value);
    }
    Ok(())
}

struct CollectionExpansion {
    value: Expr,
    type_ref: TypeRef,
    count: Option<Expr>,
}

fn expand_collection(
    nav_value: &Expr,
    options: &ExpandOptions,
    reference: bool,
    nested: &mut BinderContext,
) -> Result<CollectionExpansion> {
    let target = nested.element_type().clone();
    let target_name = target.structured_name().unwrap_or_default().to_string();
    let param = nested.source_param();
    let mut pipeline = nav_value.clone();

    if let Some(compute) = &options.compute {
        nested.bind_compute(compute)?;
    }
    if let Some(filter) = &options.filter {
        pipeline = Expr::Where {
            source: Box::new(pipeline),
            predicate: bind_filter(Some(filter), nested)?,
        };
    }
    if let Some(search) = &options.search {
        match nested.search_binder() {
            Some(search_binder) => {
                let body = predicate(search_binder.bind_search(search, nested)?)?;
                pipeline = Expr::Where {
                    source: Box::new(pipeline),
                    predicate: Lambda::new(param, target.clone(), body),
                };
            }
            None => warn!(target = %target_name, "No search binder configured; nested $search ignored"),
        }
    }

    let count = options
        .count
        .then(|| Expr::Count(Box::new(pipeline.clone())));

    let page_size = nested.settings().page_size;
    let paged = page_size.is_some() || options.top.is_some() || options.skip.is_some();
    let keys = match &options.order_by {
        Some(order_by) => bind_order_by(Some(order_by), nested)?.sort_keys(),
        None if paged && nested.settings().ensure_stable_ordering => key_ordering(nested, &target_name)?,
        None => Vec::new(),
    };
    if !keys.is_empty() {
        pipeline = Expr::OrderBy {
            source: Box::new(pipeline),
            keys,
        };
    }
    if let Some(skip) = options.skip {
        pipeline = Expr::Skip {
            source: Box::new(pipeline),
            count: skip,
        };
    }
    // one extra row past the page signals that a next page exists
    let limit = match (options.top, page_size) {
        (Some(top), Some(page)) if top <= page => Some(top),
        (_, Some(page)) => Some(page + 1),
        (top, None) => top,
    };
    if let Some(limit) = limit {
        pipeline = Expr::Take {
            source: Box::new(pipeline),
            count: limit,
        };
    }

    let (bag, shape) = if reference {
        reference_bag(nested, &target_name)?
    } else {
        let select = options.select_expand.clone().unwrap_or_default();
        let element = nested.source_expr();
        bind_level(&select, element, &target_name, nested)?
    };
    pipeline = Expr::Select {
        source: Box::new(pipeline),
        selector: Lambda::new(param, target, bag),
    };
    if nested.settings().enable_correlated_subquery_buffering {
        pipeline = Expr::Buffer(Box::new(pipeline));
    }

    Ok(CollectionExpansion {
        value: pipeline,
        type_ref: TypeRef::collection(TypeRef::record(shape)),
        count,
    })
}

fn expand_single(
    nav_value: Expr,
    name: &str,
    options: &ExpandOptions,
    reference: bool,
    nested: &mut BinderContext,
) -> Result<(Expr, TypeRef)> {
    let target_name = nested
        .element_type()
        .structured_name()
        .unwrap_or_default()
        .to_string();
    if let Some(compute) = &options.compute {
        nested.bind_compute(compute)?;
    }
    let (bag, shape) = if reference {
        reference_bag(nested, &target_name)?
    } else {
        let select = options.select_expand.clone().unwrap_or_default();
        let element = nested.source_expr();
        bind_level(&select, element, &target_name, nested)?
    };
    let record = TypeRef::record(shape).as_nullable();

    let mut body = bag;
    if let Some(filter) = &options.filter {
        if nested.settings().handle_reference_navigation_expand_filter {
            let keep = bind_filter(Some(filter), nested)?;
            body = Expr::Conditional {
                test: keep.body,
                if_true: Box::new(body),
                if_false: Box::new(Expr::null(&record)),
                type_ref: record.clone(),
            };
        } else {
            warn!(navigation = %name, "Nested filter on single-valued navigation ignored");
        }
    }

    let param = nested.source_param();
    let element = nested.source_expr();
    let value = Expr::Let {
        param,
        value: Box::new(nav_value),
        body: Box::new(Expr::Conditional {
            test: Box::new(Expr::is_null(element)),
            if_true: Box::new(Expr::null(&record)),
            if_false: Box::new(body),
            type_ref: record.clone(),
        }),
    };
    Ok((value, record))
}

/// Bag holding only the key properties (`$ref` expansions).
fn reference_bag(ctx: &BinderContext, target_name: &str) -> Result<(Expr, Arc<BagShape>)> {
    let mut level = Level::default();
    for key in ctx.model().key_properties(target_name) {
        let value = ctx.bind_property_access(ctx.source_expr(), &key)?;
        level.push(SlotShape::new(key, value.type_ref(), SlotKind::Selected), value);
    }
    Ok(level.finish(None))
}

/// Ascending order on every key property.
fn key_ordering(ctx: &BinderContext, target_name: &str) -> Result<Vec<SortKey>> {
    ctx.model()
        .key_properties(target_name)
        .iter()
        .map(|key| {
            let selector = ctx.bind_property_access(ctx.source_expr(), key)?;
            Ok(SortKey {
                selector: Lambda::new(ctx.source_param(), ctx.element_type().clone(), selector),
                descending: false,
            })
        })
        .collect()
}
