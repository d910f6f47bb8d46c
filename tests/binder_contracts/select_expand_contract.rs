//! Select/expand binder contracts.

use odex::ast::{
    BinaryOperatorKind, ComputeClause, ExpandItem, ExpandOptions, FilterClause, OrderByClause,
    PathSegment, QueryNode, SelectExpandClause, SelectItem,
};
use odex::types::{SlotKind, Value};
use odex::{bind_select_expand, BindError, BinderContext, QuerySettings, SelectExpandBinderResult};
use rust_decimal::Decimal;

use super::bind_error;
use crate::common::{
    context, context_with, ids, member, sample_model, sample_products, CUSTOMER, PRODUCT,
    SPECIAL_PRODUCT,
};

fn bind(clause: &SelectExpandClause, ctx: &mut BinderContext) -> SelectExpandBinderResult {
    bind_select_expand(Some(clause), ctx).expect("bind select/expand")
}

fn project(result: &SelectExpandBinderResult) -> Vec<Value> {
    sample_products()
        .iter()
        .map(|p| result.projector.invoke(p).expect("project"))
        .collect()
}

fn entry_names(value: &Value) -> Vec<String> {
    value
        .as_bag()
        .expect("property bag")
        .names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Nested filter whose implicit element is `$this`.
fn filter_on(node: QueryNode) -> FilterClause {
    FilterClause::with_range_variable(node, "$this")
}

// -------------------------------------------------------------------------
// Selection
// -------------------------------------------------------------------------

#[test]
fn test_partial_selection_auto_selects_key() {
    let clause = SelectExpandClause::new().select("Name").select("Price");
    let result = bind(&clause, &mut context(PRODUCT));

    assert_eq!(result.shape.names(), vec!["Name", "Price", "Id"]);
    assert_eq!(result.shape.names_of(SlotKind::AutoSelected), vec!["Id"]);
    assert!(!result.shape.has_instance());

    let rows = project(&result);
    let bag = rows[0].as_bag().unwrap();
    assert!(bag.is_auto_selected("Id"));
    assert!(bag.instance().is_none());
    assert_eq!(member(&rows[0], "Name"), Value::from("Chai"));
    assert_eq!(member(&rows[1], "Price"), Value::Decimal(Decimal::from(19)));
}

#[test]
fn test_explicitly_selected_key_is_not_auto_selected() {
    let clause = SelectExpandClause::new().select("Id").select("Name");
    let result = bind(&clause, &mut context(PRODUCT));
    assert!(result.shape.names_of(SlotKind::AutoSelected).is_empty());
    assert_eq!(result.shape.names(), vec!["Id", "Name"]);
}

#[test]
fn test_duplicate_selection_collapses() {
    let clause = SelectExpandClause::new().select("Name").select("Name");
    let result = bind(&clause, &mut context(PRODUCT));
    assert_eq!(result.shape.names(), vec!["Name", "Id"]);
}

#[test]
fn test_wildcard_carries_instance() {
    let clause = SelectExpandClause::new().select_all().select("Name");
    let result = bind(&clause, &mut context(PRODUCT));
    assert!(result.shape.has_instance());

    let rows = project(&result);
    assert!(rows[0].as_bag().unwrap().instance().is_some());
    assert_eq!(member(&rows[3], "Name"), Value::from("Tofu"));
    assert_eq!(ids(&rows), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_navigation_selected_without_expand_is_skipped() {
    let clause = SelectExpandClause::new().select("Name").select("Category");
    let result = bind(&clause, &mut context(PRODUCT));
    assert_eq!(result.shape.names(), vec!["Name", "Id"]);
}

#[test]
fn test_complex_paths_merge_into_nested_bag() {
    let clause = SelectExpandClause::new()
        .select_path(vec![
            PathSegment::Property("Origin".into()),
            PathSegment::Property("City".into()),
        ])
        .select_path(vec![
            PathSegment::Property("Origin".into()),
            PathSegment::Property("Zip".into()),
        ]);
    let result = bind(&clause, &mut context(PRODUCT));
    assert_eq!(result.shape.names(), vec!["Origin", "Id"]);

    let rows = project(&result);
    let origin = member(&rows[0], "Origin");
    assert_eq!(entry_names(&origin), vec!["City", "Zip"]);
    assert_eq!(member(&origin, "City"), Value::from("Seattle"));
    // no address on product 2
    assert_eq!(member(&rows[1], "Origin"), Value::Null);
}

#[test]
fn test_derived_type_segment_selects_nullable_slot() {
    let clause = SelectExpandClause::new().select_path(vec![
        PathSegment::Type(SPECIAL_PRODUCT.into()),
        PathSegment::Property("Discount".into()),
    ]);
    let result = bind(&clause, &mut context(PRODUCT));
    let slot = result.shape.slot("Discount").unwrap();
    assert!(slot.type_ref.nullable);

    let rows = project(&result);
    assert_eq!(member(&rows[0], "Discount"), Value::Null);
    assert_eq!(member(&rows[4], "Discount"), Value::Double(0.1));
}

#[test]
fn test_computed_property_selected() {
    let mut ctx = context(PRODUCT);
    let total = QueryNode::binary(
        BinaryOperatorKind::Multiply,
        QueryNode::prop("Price"),
        QueryNode::prop("Quantity"),
    );
    ctx.bind_compute(&ComputeClause::default().with(total, "Total"))
        .unwrap();

    let clause = SelectExpandClause::new().select("Total");
    let result = bind(&clause, &mut ctx);
    assert_eq!(result.shape.slot("Total").unwrap().kind, SlotKind::Computed);

    let rows = project(&result);
    assert_eq!(member(&rows[1], "Total"), Value::Decimal(Decimal::from(380)));
}

#[test]
fn test_open_type_selection_is_dynamic() {
    use odex::types::Record;

    let mut ctx = BinderContext::new(sample_model(), CUSTOMER).unwrap();
    let clause = SelectExpandClause::new().select("Name").select("Tier");
    let result = bind(&clause, &mut ctx);
    assert_eq!(result.shape.slot("Tier").unwrap().kind, SlotKind::Dynamic);

    let gold = Value::resource(
        Record::new(CUSTOMER)
            .with("Id", 7)
            .with("Name", "Ada")
            .with_dynamic("Tier", "Gold"),
    );
    let plain = Value::resource(Record::new(CUSTOMER).with("Id", 8).with("Name", "Bo"));
    assert_eq!(member(&result.projector.invoke(&gold).unwrap(), "Tier"), Value::from("Gold"));
    assert_eq!(member(&result.projector.invoke(&plain).unwrap(), "Tier"), Value::Null);
}

#[test]
fn test_unknown_selected_property_rejected() {
    let clause = SelectExpandClause::new().select("Nope");
    let err = bind_select_expand(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert_eq!(
        bind_error(&err),
        &BindError::PropertyNotFound {
            type_name: PRODUCT.into(),
            property: "Nope".into(),
        }
    );
}

#[test]
fn test_missing_clause_is_argument_null() {
    let err = bind_select_expand(None, &mut context(PRODUCT)).unwrap_err();
    assert_eq!(bind_error(&err), &BindError::ArgumentNull("selectexpand".into()));
}

// -------------------------------------------------------------------------
// Expansion
// -------------------------------------------------------------------------

#[test]
fn test_single_navigation_expansion() {
    let clause = SelectExpandClause::new().select("Name").expand("Category");
    let result = bind(&clause, &mut context(PRODUCT));
    assert_eq!(result.shape.names(), vec!["Name", "Id", "Category"]);
    assert_eq!(result.shape.slot("Category").unwrap().kind, SlotKind::Expanded);

    let rows = project(&result);
    assert_eq!(member(&member(&rows[0], "Category"), "Name"), Value::from("Beverages"));
    // product 3 has no category
    assert_eq!(member(&rows[2], "Category"), Value::Null);
}

#[test]
fn test_single_navigation_filter_nulls_out_mismatch() {
    let options = ExpandOptions {
        filter: Some(filter_on(QueryNode::eq(
            QueryNode::this_prop("Name"),
            QueryNode::constant("Produce"),
        ))),
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().expand_with("Category", options.clone());

    let rows = project(&bind(&clause, &mut context(PRODUCT)));
    assert_eq!(member(&rows[0], "Category"), Value::Null);
    assert_eq!(member(&member(&rows[3], "Category"), "Name"), Value::from("Produce"));

    let settings = QuerySettings::new().with_reference_navigation_expand_filter(false);
    let rows = project(&bind(&clause, &mut context_with(PRODUCT, settings)));
    assert_eq!(member(&member(&rows[0], "Category"), "Name"), Value::from("Beverages"));
}

#[test]
fn test_collection_expansion_pipeline() {
    let options = ExpandOptions {
        filter: Some(filter_on(QueryNode::gt(
            QueryNode::this_prop("Amount"),
            QueryNode::constant(30),
        ))),
        order_by: Some(OrderByClause::desc(QueryNode::this_prop("Amount"))),
        top: Some(1),
        count: true,
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().select("Name").expand_with("Orders", options);
    let result = bind(&clause, &mut context(PRODUCT));
    assert_eq!(result.shape.names(), vec!["Name", "Id", "Orders", "Orders/$count"]);
    assert_eq!(
        result.shape.slot("Orders/$count").unwrap().kind,
        SlotKind::NestedCount
    );

    let rows = project(&result);
    let tofu_orders = member(&rows[3], "Orders");
    assert_eq!(ids(tofu_orders.as_collection().unwrap()), vec![15]);
    // count is taken before paging
    assert_eq!(member(&rows[3], "Orders/$count"), Value::Int64(2));

    let syrup_orders = member(&rows[2], "Orders");
    assert!(syrup_orders.as_collection().unwrap().is_empty());
    assert_eq!(member(&rows[2], "Orders/$count"), Value::Int64(0));
}

#[test]
fn test_nested_filter_reads_root_through_it() {
    let options = ExpandOptions {
        filter: Some(filter_on(QueryNode::eq(
            QueryNode::it().property("Name"),
            QueryNode::constant("Chai"),
        ))),
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().expand_with("Orders", options);
    let rows = project(&bind(&clause, &mut context(PRODUCT)));

    let kept: Vec<Vec<i32>> = rows
        .iter()
        .map(|row| ids(member(row, "Orders").as_collection().unwrap()))
        .collect();
    assert_eq!(kept, vec![vec![10, 11], vec![], vec![], vec![], vec![]]);
}

#[test]
fn test_nested_filter_correlates_with_root() {
    let options = ExpandOptions {
        filter: Some(filter_on(QueryNode::gt(
            QueryNode::this_prop("Amount"),
            QueryNode::prop("Price"),
        ))),
        order_by: Some(OrderByClause::asc(QueryNode::this_prop("Id"))),
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().expand_with("Orders", options);
    let result = bind(&clause, &mut context(PRODUCT));
    assert!(result.projector.is_closed());

    let kept: Vec<Vec<i32>> = project(&result)
        .iter()
        .map(|row| ids(member(row, "Orders").as_collection().unwrap()))
        .collect();
    assert_eq!(kept, vec![vec![10], vec![12], vec![], vec![14, 15], vec![]]);
}

#[test]
fn test_nested_it_keeps_root_type() {
    // `$it` keeps the root type inside an expansion
    let options = ExpandOptions {
        filter: Some(filter_on(QueryNode::eq(
            QueryNode::it().property("Amount"),
            QueryNode::constant(1),
        ))),
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().expand_with("Orders", options);
    let err = bind_select_expand(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::PropertyNotFound { .. }));
}

#[test]
fn test_nested_selection_auto_selects_concurrency_token() {
    let options = ExpandOptions {
        select_expand: Some(SelectExpandClause::new().select("Amount")),
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().expand_with("Orders", options);
    let rows = project(&bind(&clause, &mut context(PRODUCT)));

    let orders = member(&rows[0], "Orders");
    let first = &orders.as_collection().unwrap()[0];
    assert_eq!(entry_names(first), vec!["Amount", "Id", "ETag"]);
    assert_eq!(member(first, "ETag"), Value::from("etag-10"));
}

#[test]
fn test_page_size_orders_by_key_and_takes_one_extra() {
    let settings = QuerySettings::new().with_page_size(1);
    let clause = SelectExpandClause::new().expand("Orders");
    let rows = project(&bind(&clause, &mut context_with(PRODUCT, settings.clone())));
    let orders = member(&rows[3], "Orders");
    assert_eq!(ids(orders.as_collection().unwrap()), vec![13, 14]);

    let options = ExpandOptions {
        top: Some(1),
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().expand_with("Orders", options);
    let rows = project(&bind(&clause, &mut context_with(PRODUCT, settings)));
    let orders = member(&rows[3], "Orders");
    assert_eq!(ids(orders.as_collection().unwrap()), vec![13]);
}

#[test]
fn test_skip_in_expansion() {
    let options = ExpandOptions {
        skip: Some(1),
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().expand_with("Orders", options);
    let rows = project(&bind(&clause, &mut context(PRODUCT)));
    let orders = member(&rows[3], "Orders");
    assert_eq!(ids(orders.as_collection().unwrap()), vec![14, 15]);
}

#[test]
fn test_reference_expansion_carries_keys_only() {
    let clause = SelectExpandClause::new().select("Name").expand_ref("Orders");
    let rows = project(&bind(&clause, &mut context(PRODUCT)));
    let orders = member(&rows[0], "Orders");
    let refs = orders.as_collection().unwrap();
    assert_eq!(ids(refs), vec![10, 11]);
    assert_eq!(entry_names(&refs[0]), vec!["Id"]);
    assert!(refs[0].as_bag().unwrap().instance().is_none());
}

#[test]
fn test_expansion_behind_type_segment() {
    let item = ExpandItem {
        path: vec![
            PathSegment::Type(SPECIAL_PRODUCT.into()),
            PathSegment::Property("Orders".into()),
        ],
        options: ExpandOptions::default(),
    };
    let clause = SelectExpandClause {
        items: vec![SelectItem::Expand(item)],
    };
    let rows = project(&bind(&clause, &mut context(PRODUCT)));
    assert_eq!(member(&rows[0], "Orders"), Value::Null);
    let orders = member(&rows[4], "Orders");
    assert_eq!(ids(orders.as_collection().unwrap()), vec![16]);
}

#[test]
fn test_buffering_does_not_change_results() {
    let options = ExpandOptions {
        order_by: Some(OrderByClause::desc(QueryNode::this_prop("Quantity"))),
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().expand_with("Orders", options);
    let plain = project(&bind(&clause, &mut context(PRODUCT)));
    let settings = QuerySettings::new().with_correlated_subquery_buffering(true);
    let buffered_result = bind(&clause, &mut context_with(PRODUCT, settings));
    assert!(buffered_result.projector.plan_key().contains(".Buffer()"));
    assert_eq!(project(&buffered_result), plain);
}

#[test]
fn test_expanding_structural_property_rejected() {
    let clause = SelectExpandClause::new().expand("Name");
    let err = bind_select_expand(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::UnsupportedNode(_)));
}

#[test]
fn test_expanding_unknown_navigation_rejected() {
    let clause = SelectExpandClause::new().expand("Suppliers");
    let err = bind_select_expand(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::PropertyNotFound { .. }));
}

#[test]
fn test_nested_filter_errors_surface() {
    let options = ExpandOptions {
        filter: Some(filter_on(QueryNode::eq(
            QueryNode::this_prop("Missing"),
            QueryNode::constant(1),
        ))),
        ..ExpandOptions::default()
    };
    let clause = SelectExpandClause::new().expand_with("Orders", options);
    let err = bind_select_expand(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::PropertyNotFound { .. }));
}
