//! OrderBy binder contracts.

use odex::ast::{BinaryOperatorKind, ComputeClause, OrderByClause, OrderByDirection, QueryNode};
use odex::{bind_order_by, BindError, InMemoryQueryable};

use super::bind_error;
use crate::common::{context, ids, sample_model, sample_products, CUSTOMER, PRODUCT};

fn ordered_ids(clause: &OrderByClause) -> Vec<i32> {
    let mut ctx = context(PRODUCT);
    let order_by = bind_order_by(Some(clause), &mut ctx).expect("bind orderby");
    let ordered = InMemoryQueryable::new(sample_products())
        .order_by(&order_by)
        .expect("evaluate ordering");
    ids(ordered.items())
}

#[test]
fn test_order_by_string_ascending() {
    let clause = OrderByClause::asc(QueryNode::prop("Name"));
    assert_eq!(ordered_ids(&clause), vec![3, 1, 2, 5, 4]);
}

#[test]
fn test_order_by_decimal_descending() {
    let clause = OrderByClause::desc(QueryNode::prop("Price"));
    assert_eq!(ordered_ids(&clause), vec![5, 4, 2, 1, 3]);
}

#[test]
fn test_nulls_sort_first_and_ties_keep_input_order() {
    let clause = OrderByClause::asc(QueryNode::prop("Rating"));
    assert_eq!(ordered_ids(&clause), vec![2, 4, 3, 1, 5]);
}

#[test]
fn test_enum_orders_by_underlying_value() {
    let clause = OrderByClause::asc(QueryNode::prop("Color"));
    assert_eq!(ordered_ids(&clause), vec![1, 4, 2, 3, 5]);
}

#[test]
fn test_navigation_path_then_by_descending() {
    let clause = OrderByClause::asc(QueryNode::prop("Category").property("Name"))
        .then(OrderByClause::desc(QueryNode::prop("Price")));
    assert_eq!(ordered_ids(&clause), vec![3, 2, 1, 5, 4]);
}

#[test]
fn test_count_key_then_id() {
    let clause = OrderByClause::desc(QueryNode::count(QueryNode::prop("Orders")))
        .then(OrderByClause::asc(QueryNode::prop("Id")));
    assert_eq!(ordered_ids(&clause), vec![4, 1, 2, 5, 3]);
}

#[test]
fn test_chain_preserves_clause_order() {
    let clause = OrderByClause::asc(QueryNode::prop("Name"))
        .then(OrderByClause::desc(QueryNode::prop("Price")))
        .then(OrderByClause::asc(QueryNode::prop("Id")));
    let result = bind_order_by(Some(&clause), &mut context(PRODUCT)).unwrap();

    assert_eq!(result.key_count(), 3);
    let directions: Vec<bool> = result.sort_keys().iter().map(|k| k.descending).collect();
    assert_eq!(directions, vec![false, true, false]);
    let second = result.then_by.as_deref().unwrap();
    assert_eq!(second.direction, OrderByDirection::Descending);
}

#[test]
fn test_order_by_computed_alias() {
    let mut ctx = context(PRODUCT);
    let total = QueryNode::binary(
        BinaryOperatorKind::Multiply,
        QueryNode::prop("Price"),
        QueryNode::prop("Quantity"),
    );
    ctx.bind_compute(&ComputeClause::default().with(total, "Total"))
        .unwrap();

    let clause = OrderByClause::desc(QueryNode::prop("Total"));
    let order_by = bind_order_by(Some(&clause), &mut ctx).unwrap();
    let ordered = InMemoryQueryable::new(sample_products())
        .order_by(&order_by)
        .unwrap();
    assert_eq!(ids(ordered.items()), vec![5, 4, 2, 3, 1]);
}

#[test]
fn test_order_by_navigation_rejected() {
    let clause = OrderByClause::asc(QueryNode::prop("Category"));
    let err = bind_order_by(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::IncompatibleOperandTypes(_)));
}

#[test]
fn test_order_by_collection_rejected() {
    let clause = OrderByClause::asc(QueryNode::prop("Tags"));
    let err = bind_order_by(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::IncompatibleOperandTypes(_)));
}

#[test]
fn test_error_in_then_by_reported() {
    let clause = OrderByClause::asc(QueryNode::prop("Name"))
        .then(OrderByClause::asc(QueryNode::prop("Missing")));
    let err = bind_order_by(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::PropertyNotFound { .. }));
}

#[test]
fn test_missing_clause_is_argument_null() {
    let err = bind_order_by(None, &mut context(PRODUCT)).unwrap_err();
    assert_eq!(bind_error(&err), &BindError::ArgumentNull("orderby".into()));
}

#[test]
fn test_order_by_dynamic_property_of_open_type() {
    use odex::types::{Record, Value};

    let customers = vec![
        Value::resource(Record::new(CUSTOMER).with("Id", 1).with_dynamic("Tier", "Silver")),
        Value::resource(Record::new(CUSTOMER).with("Id", 2)),
        Value::resource(Record::new(CUSTOMER).with("Id", 3).with_dynamic("Tier", "Gold")),
    ];
    let mut ctx = odex::BinderContext::new(sample_model(), CUSTOMER).unwrap();
    let clause = OrderByClause::asc(QueryNode::prop("Tier"));
    let order_by = bind_order_by(Some(&clause), &mut ctx).unwrap();
    let ordered = InMemoryQueryable::new(customers).order_by(&order_by).unwrap();
    assert_eq!(ids(ordered.items()), vec![2, 3, 1]);
}
