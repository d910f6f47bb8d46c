//! Aggregation binder contracts.

use odex::ast::{
    AggregateClause, AggregateExpression, AggregationMethod, FilterClause, GroupByClause,
    GroupByPropertyNode, QueryNode,
};
use odex::types::{Record, SlotKind, Value};
use odex::{bind_apply, AggregationBinderResult, BindError, BinderContext, InMemoryQueryable};
use rust_decimal::Decimal;

use super::bind_error;
use crate::common::{
    context, member, product, sample_model, sample_products, CUSTOMER, PRODUCT,
};

fn by_category_name() -> GroupByClause {
    GroupByClause {
        properties: vec![GroupByPropertyNode::level(
            "Category",
            vec![GroupByPropertyNode::leaf(
                "Name",
                QueryNode::prop("Category").property("Name"),
            )],
        )],
    }
}

fn aggregate(expressions: Vec<AggregateExpression>) -> AggregateClause {
    AggregateClause { expressions }
}

fn run(result: &AggregationBinderResult) -> Vec<Value> {
    InMemoryQueryable::new(sample_products())
        .apply(result)
        .expect("evaluate aggregation")
        .into_vec()
}

fn category_of(group: &Value) -> Value {
    member(&member(group, "Category"), "Name")
}

#[test]
fn test_group_by_navigation_with_sum_and_count() {
    let group_by = by_category_name();
    let aggregates = aggregate(vec![
        AggregateExpression::property(QueryNode::prop("Price"), AggregationMethod::Sum, "Total"),
        AggregateExpression::count("Count"),
    ]);
    let result = bind_apply(Some(&group_by), Some(&aggregates), &mut context(PRODUCT)).unwrap();

    assert_eq!(result.result_shape.names(), vec!["Category", "Total", "Count"]);
    assert_eq!(result.key_shape.names_of(SlotKind::GroupKey), vec!["Category"]);
    assert_eq!(result.aggregate_shape.names_of(SlotKind::Aggregate), vec!["Total", "Count"]);

    let groups = run(&result);
    assert_eq!(groups.len(), 3);
    // groups appear in first-seen order; product 3 has no category
    let categories: Vec<Value> = groups.iter().map(category_of).collect();
    assert_eq!(
        categories,
        vec![Value::from("Beverages"), Value::Null, Value::from("Produce")]
    );
    let totals: Vec<Value> = groups.iter().map(|g| member(g, "Total")).collect();
    assert_eq!(
        totals,
        vec![
            Value::Decimal(Decimal::from(37)),
            Value::Decimal(Decimal::from(10)),
            Value::Decimal(Decimal::from(68)),
        ]
    );
    let counts: Vec<Value> = groups.iter().map(|g| member(g, "Count")).collect();
    assert_eq!(counts, vec![Value::Int64(2), Value::Int64(1), Value::Int64(2)]);
}

#[test]
fn test_aggregate_without_grouping_yields_one_group() {
    let aggregates = aggregate(vec![
        AggregateExpression::property(QueryNode::prop("Quantity"), AggregationMethod::Sum, "Units"),
        AggregateExpression::property(QueryNode::prop("Price"), AggregationMethod::Average, "AvgPrice"),
        AggregateExpression::property(QueryNode::prop("Quantity"), AggregationMethod::Average, "AvgUnits"),
        AggregateExpression::property(QueryNode::prop("Rating"), AggregationMethod::Max, "Best"),
        AggregateExpression::property(QueryNode::prop("Rating"), AggregationMethod::Min, "Worst"),
        AggregateExpression::property(
            QueryNode::prop("Category").property("Name"),
            AggregationMethod::CountDistinct,
            "Categories",
        ),
    ]);
    let result = bind_apply(None, Some(&aggregates), &mut context(PRODUCT)).unwrap();
    assert!(result.key_shape.is_empty());

    let groups = run(&result);
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(member(group, "Units"), Value::Int64(150));
    assert_eq!(member(group, "AvgPrice"), Value::Decimal(Decimal::from(23)));
    assert_eq!(member(group, "AvgUnits"), Value::Double(30.0));
    assert_eq!(member(group, "Best"), Value::Double(5.0));
    assert_eq!(member(group, "Worst"), Value::Double(3.0));
    // nulls are skipped
    assert_eq!(member(group, "Categories"), Value::Int64(2));
}

#[test]
fn test_result_types_follow_method() {
    let aggregates = aggregate(vec![
        AggregateExpression::property(QueryNode::prop("Quantity"), AggregationMethod::Sum, "Units"),
        AggregateExpression::property(QueryNode::prop("Quantity"), AggregationMethod::Average, "AvgUnits"),
        AggregateExpression::property(QueryNode::prop("Name"), AggregationMethod::Min, "First"),
    ]);
    let result = bind_apply(None, Some(&aggregates), &mut context(PRODUCT)).unwrap();
    let shape = &result.aggregate_shape;

    let units = &shape.slot("Units").unwrap().type_ref;
    assert_eq!(units.name(), "Edm.Int64");
    assert!(!units.nullable);
    let average = &shape.slot("AvgUnits").unwrap().type_ref;
    assert_eq!(average.name(), "Edm.Double");
    assert!(average.nullable);
    assert!(shape.slot("First").unwrap().type_ref.nullable);
}

#[test]
fn test_collection_navigation_aggregate_with_filter() {
    let group_by = by_category_name();
    let aggregates = aggregate(vec![AggregateExpression::Collection {
        navigation: "Orders".into(),
        filter: Some(FilterClause::new(QueryNode::gt(
            QueryNode::prop("Quantity"),
            QueryNode::constant(1),
        ))),
        children: vec![AggregateExpression::property(
            QueryNode::prop("Amount"),
            AggregationMethod::Sum,
            "Total",
        )],
        alias: "Orders".into(),
    }]);
    let result = bind_apply(Some(&group_by), Some(&aggregates), &mut context(PRODUCT)).unwrap();

    let totals: Vec<Value> = run(&result)
        .iter()
        .map(|g| member(&member(g, "Orders"), "Total"))
        .collect();
    assert_eq!(
        totals,
        vec![
            Value::Decimal(Decimal::from(131)),
            Value::Decimal(Decimal::ZERO),
            Value::Decimal(Decimal::from(115)),
        ]
    );
}

#[test]
fn test_dynamic_sum_converts_to_decimal() {
    let customers = vec![
        Value::resource(Record::new(CUSTOMER).with("Id", 1).with_dynamic("Score", 2)),
        Value::resource(Record::new(CUSTOMER).with("Id", 2)),
        Value::resource(Record::new(CUSTOMER).with("Id", 3).with_dynamic("Score", 3)),
    ];
    let aggregates = aggregate(vec![AggregateExpression::property(
        QueryNode::prop("Score"),
        AggregationMethod::Sum,
        "Score",
    )]);
    let mut ctx = BinderContext::new(sample_model(), CUSTOMER).unwrap();
    let result = bind_apply(None, Some(&aggregates), &mut ctx).unwrap();
    let groups = InMemoryQueryable::new(customers).apply(&result).unwrap().into_vec();
    assert_eq!(member(&groups[0], "Score"), Value::Decimal(Decimal::from(5)));
}

#[test]
fn test_group_by_only_lists_distinct_keys() {
    let group_by = GroupByClause {
        properties: vec![GroupByPropertyNode::leaf("Color", QueryNode::prop("Color"))],
    };
    let result = bind_apply(Some(&group_by), None, &mut context(PRODUCT)).unwrap();
    assert!(result.aggregate_shape.is_empty());
    assert_eq!(run(&result).len(), 5);
}

#[test]
fn test_group_by_double_merges_signed_zero_and_nan() {
    let group_by = GroupByClause {
        properties: vec![GroupByPropertyNode::leaf("Rating", QueryNode::prop("Rating"))],
    };
    let aggregates = aggregate(vec![AggregateExpression::count("Count")]);
    let result = bind_apply(Some(&group_by), Some(&aggregates), &mut context(PRODUCT)).unwrap();

    let ratings = [0.0, -0.0, f64::NAN, f64::NAN];
    let source: Vec<Value> = ratings
        .iter()
        .zip(1..)
        .map(|(rating, id)| Value::resource(product(id, "P", 1).with("Rating", *rating)))
        .collect();
    let groups = InMemoryQueryable::new(source)
        .apply(&result)
        .expect("evaluate aggregation")
        .into_vec();

    assert_eq!(groups.len(), 2);
    let counts: Vec<Value> = groups.iter().map(|g| member(g, "Count")).collect();
    assert_eq!(counts, vec![Value::Int64(2), Value::Int64(2)]);
    assert_eq!(member(&groups[0], "Rating"), Value::Double(0.0));
}

#[test]
fn test_sum_of_string_rejected() {
    let aggregates = aggregate(vec![AggregateExpression::property(
        QueryNode::prop("Name"),
        AggregationMethod::Sum,
        "Total",
    )]);
    let err = bind_apply(None, Some(&aggregates), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::IncompatibleOperandTypes(_)));
}

#[test]
fn test_max_of_collection_rejected() {
    let aggregates = aggregate(vec![AggregateExpression::property(
        QueryNode::prop("Tags"),
        AggregationMethod::Max,
        "Top",
    )]);
    let err = bind_apply(None, Some(&aggregates), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::IncompatibleOperandTypes(_)));
}

#[test]
fn test_collection_aggregate_over_single_navigation_rejected() {
    let aggregates = aggregate(vec![AggregateExpression::Collection {
        navigation: "Category".into(),
        filter: None,
        children: vec![AggregateExpression::count("Count")],
        alias: "Category".into(),
    }]);
    let err = bind_apply(None, Some(&aggregates), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::UnsupportedNode(_)));
}

#[test]
fn test_unknown_group_key_rejected() {
    let group_by = GroupByClause {
        properties: vec![GroupByPropertyNode::leaf("Brand", QueryNode::prop("Brand"))],
    };
    let err = bind_apply(Some(&group_by), None, &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::PropertyNotFound { .. }));
}

#[test]
fn test_missing_clauses_are_argument_null() {
    let err = bind_apply(None, None, &mut context(PRODUCT)).unwrap_err();
    assert_eq!(bind_error(&err), &BindError::ArgumentNull("apply".into()));
}
