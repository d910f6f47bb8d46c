//! Filter binder contracts.

use std::sync::Arc;

use chrono::DateTime;
use odex::ast::{FilterClause, QueryNode};
use odex::binder::{FunctionRegistry, FunctionSignature};
use odex::types::{Record, TypeRef, Value};
use odex::{
    bind_filter, register_function, unregister_function, BindError, HostFunction,
    NullPropagation, OdexError, QuerySettings,
};

use super::{bind_error, matching_events, matching_ids};
use rust_decimal::Decimal;

use crate::common::{
    context, context_with, date, sample_products, time, ADDRESS, CUSTOMER, EVENT, PRODUCT,
    SPECIAL_PRODUCT,
};

fn filter(expression: QueryNode) -> FilterClause {
    FilterClause::new(expression)
}

fn strict() -> QuerySettings {
    QuerySettings::new().with_null_propagation(NullPropagation::Strict)
}

// -------------------------------------------------------------------------
// Comparisons and promotion
// -------------------------------------------------------------------------

#[test]
fn test_string_equality() {
    let clause = filter(QueryNode::eq(QueryNode::prop("Name"), QueryNode::constant("Chai")));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1]);
}

#[test]
fn test_int_literal_promoted_to_decimal() {
    let clause = filter(QueryNode::gt(QueryNode::prop("Price"), QueryNode::constant(18)));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![2, 4, 5]);
}

#[test]
fn test_arithmetic_in_comparison() {
    let sum = QueryNode::binary(
        odex::ast::BinaryOperatorKind::Add,
        QueryNode::prop("Price"),
        QueryNode::constant(2),
    );
    let clause = filter(QueryNode::gt(sum, QueryNode::constant(20)));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![2, 4, 5]);
}

#[test]
fn test_null_comparison_on_nullable_property() {
    let clause = filter(QueryNode::eq(QueryNode::prop("Rating"), QueryNode::null()));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![2, 4]);
}

#[test]
fn test_string_compared_with_number_is_incompatible() {
    let clause = filter(QueryNode::eq(QueryNode::prop("Name"), QueryNode::constant(1)));
    let err = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::IncompatibleOperandTypes(_)));
}

// -------------------------------------------------------------------------
// Navigation and null propagation
// -------------------------------------------------------------------------

#[test]
fn test_single_navigation_path_propagates_null() {
    let clause = filter(QueryNode::eq(
        QueryNode::prop("Category").property("Name"),
        QueryNode::constant("Beverages"),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1, 2]);
}

#[test]
fn test_strict_mode_fails_on_null_navigation() {
    let clause = filter(QueryNode::eq(
        QueryNode::prop("Category").property("Name"),
        QueryNode::constant("Beverages"),
    ));
    let predicate = bind_filter(Some(&clause), &mut context_with(PRODUCT, strict())).unwrap();
    let products = sample_products();

    assert!(predicate.test(&products[0]).unwrap());
    let err = predicate.test(&products[2]).unwrap_err();
    assert!(matches!(err, OdexError::NullReference(_)));
}

#[test]
fn test_remote_source_defaults_to_strict() {
    let ctx = context(PRODUCT).with_source_kind(odex::SourceKind::Remote);
    assert!(!ctx.propagates_nulls());
    let ctx = context(PRODUCT);
    assert!(ctx.propagates_nulls());
}

// -------------------------------------------------------------------------
// Quantifiers and counts
// -------------------------------------------------------------------------

#[test]
fn test_any_with_predicate() {
    let clause = filter(QueryNode::any(
        QueryNode::prop("Orders"),
        "o",
        QueryNode::gt(QueryNode::range("o").property("Amount"), QueryNode::constant(50)),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![2, 4]);
}

#[test]
fn test_any_without_predicate_is_non_empty() {
    let clause = filter(QueryNode::any_empty(QueryNode::prop("Orders")));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1, 2, 4, 5]);
}

#[test]
fn test_any_true_collapses_to_non_empty_test() {
    let clause = filter(QueryNode::any(
        QueryNode::prop("Orders"),
        "o",
        QueryNode::constant(true),
    ));
    let predicate = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap();
    let empty = filter(QueryNode::any_empty(QueryNode::prop("Orders")));
    let expected = bind_filter(Some(&empty), &mut context(PRODUCT)).unwrap();
    assert_eq!(predicate.plan_key(), expected.plan_key());
}

#[test]
fn test_all_is_vacuously_true_on_empty() {
    let clause = filter(QueryNode::all(
        QueryNode::prop("Orders"),
        "o",
        QueryNode::lt(QueryNode::range("o").property("Quantity"), QueryNode::constant(3)),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1, 3, 5]);
}

#[test]
fn test_count_of_collection() {
    let clause = filter(QueryNode::gt(
        QueryNode::count(QueryNode::prop("Orders")),
        QueryNode::constant(1),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1, 4]);
}

#[test]
fn test_count_with_nested_filter_binds_this() {
    let nested = FilterClause::new(QueryNode::gt(
        QueryNode::this().property("Quantity"),
        QueryNode::constant(1),
    ));
    let clause = filter(QueryNode::gt(
        QueryNode::count_where(QueryNode::prop("Orders"), nested),
        QueryNode::constant(0),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1, 2, 4]);
}

#[test]
fn test_lambda_outer_variable_visible_inside() {
    // Orders/any(o: o/Amount gt $it/Price)
    let clause = filter(QueryNode::any(
        QueryNode::prop("Orders"),
        "o",
        QueryNode::gt(QueryNode::range("o").property("Amount"), QueryNode::prop("Price")),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1, 2, 4]);
}

#[test]
fn test_sibling_lambdas_reuse_variable_name() {
    let clause = filter(QueryNode::and(
        QueryNode::any_empty(QueryNode::prop("Orders")),
        QueryNode::all(
            QueryNode::prop("Orders"),
            "o",
            QueryNode::gt(QueryNode::range("o").property("Amount"), QueryNode::constant(0)),
        ),
    ));
    let clause = filter(QueryNode::and(
        clause.expression,
        QueryNode::any(
            QueryNode::prop("Orders"),
            "o",
            QueryNode::eq(QueryNode::range("o").property("Quantity"), QueryNode::constant(1)),
        ),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1, 4, 5]);
}

#[test]
fn test_nested_lambda_redeclaring_variable_rejected() {
    let inner = QueryNode::any(QueryNode::prop("Orders"), "o", QueryNode::constant(true));
    let clause = filter(QueryNode::any(QueryNode::prop("Orders"), "o", inner));
    let err = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert_eq!(bind_error(&err), &BindError::DuplicateVariable("o".into()));
}

#[test]
fn test_variable_out_of_scope_rejected() {
    let clause = filter(QueryNode::any(
        QueryNode::prop("Orders"),
        "o",
        QueryNode::gt(QueryNode::range("x").property("Amount"), QueryNode::constant(1)),
    ));
    let err = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert_eq!(bind_error(&err), &BindError::UndefinedVariable("x".into()));
}

#[test]
fn test_failed_lambda_does_not_leak_variable() {
    let mut ctx = context(PRODUCT);
    let bad = filter(QueryNode::any(
        QueryNode::prop("Orders"),
        "o",
        QueryNode::range("o").property("Missing"),
    ));
    assert!(bind_filter(Some(&bad), &mut ctx).is_err());
    assert!(!ctx.scope().contains("o"));

    let good = filter(QueryNode::any_empty(QueryNode::prop("Orders")));
    assert!(bind_filter(Some(&good), &mut ctx).is_ok());
}

// -------------------------------------------------------------------------
// In, enums
// -------------------------------------------------------------------------

#[test]
fn test_in_literal_list() {
    let list = QueryNode::CollectionConstant {
        items: vec![Value::Int32(1), Value::Int32(3)],
        item_type: TypeRef::int32(),
    };
    let clause = filter(QueryNode::in_list(QueryNode::prop("Id"), list));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1, 3]);
}

#[test]
fn test_enum_in_string_list() {
    let list = QueryNode::CollectionConstant {
        items: vec![Value::from("Blue"), Value::from("Green")],
        item_type: TypeRef::string(),
    };
    let clause = filter(QueryNode::in_list(QueryNode::prop("Color"), list));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![3, 4]);
}

#[test]
fn test_enum_equals_member_name() {
    let clause = filter(QueryNode::eq(QueryNode::prop("Color"), QueryNode::constant("Blue")));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![3]);
}

#[test]
fn test_has_flag() {
    let clause = filter(QueryNode::binary(
        odex::ast::BinaryOperatorKind::Has,
        QueryNode::prop("Color"),
        QueryNode::constant("Green"),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![2, 4, 5]);
}

#[test]
fn test_unknown_enum_member_rejected() {
    let clause = filter(QueryNode::eq(QueryNode::prop("Color"), QueryNode::constant("Purple")));
    let err = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::IncompatibleOperandTypes(_)));
}

// -------------------------------------------------------------------------
// Casts and type checks
// -------------------------------------------------------------------------

#[test]
fn test_isof_derived_type() {
    let clause = filter(QueryNode::IsOf {
        source: None,
        type_name: SPECIAL_PRODUCT.into(),
    });
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![5]);
}

#[test]
fn test_cast_then_derived_property() {
    let clause = filter(QueryNode::gt(
        QueryNode::cast(QueryNode::it(), SPECIAL_PRODUCT).property("Discount"),
        QueryNode::constant(0.05),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![5]);
}

#[test]
fn test_type_segment_then_derived_property() {
    let clause = filter(QueryNode::eq(
        QueryNode::it().cast_to(SPECIAL_PRODUCT).property("Discount"),
        QueryNode::constant(0.1),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![5]);
}

#[test]
fn test_cast_is_idempotent() {
    let once = QueryNode::cast(QueryNode::it(), SPECIAL_PRODUCT);
    let twice = QueryNode::cast(once.clone(), SPECIAL_PRODUCT);
    let single = filter(QueryNode::ne(once, QueryNode::null()));
    let double = filter(QueryNode::ne(twice, QueryNode::null()));
    assert_eq!(
        matching_ids(&single, &mut context(PRODUCT)),
        matching_ids(&double, &mut context(PRODUCT))
    );
}

#[test]
fn test_cast_to_unrelated_type_rejected_in_every_form() {
    let forms = vec![
        QueryNode::cast(QueryNode::it(), ADDRESS),
        QueryNode::is_of(QueryNode::it(), ADDRESS),
        QueryNode::Cast {
            source: None,
            type_name: ADDRESS.into(),
        },
        QueryNode::IsOf {
            source: None,
            type_name: ADDRESS.into(),
        },
        QueryNode::it().cast_to(ADDRESS),
        QueryNode::call("cast", vec![QueryNode::it(), QueryNode::constant(ADDRESS)]),
        QueryNode::call("isof", vec![QueryNode::constant(ADDRESS)]),
    ];
    for node in forms {
        let err = odex::bind_expression(&node, &mut context(PRODUCT)).unwrap_err();
        assert!(
            matches!(bind_error(&err), BindError::InvalidCast(_)),
            "expected InvalidCast for {node:?}, got {err}"
        );
    }
}

#[test]
fn test_primitive_cast_of_literal_folds() {
    let node = QueryNode::cast(QueryNode::constant("42"), "Edm.Int32");
    let expr = odex::bind_expression(&node, &mut context(PRODUCT)).unwrap();
    assert_eq!(expr.evaluate().unwrap(), Value::Int32(42));
}

#[test]
fn test_cast_collection_to_primitive_is_null() {
    let node = QueryNode::cast(QueryNode::prop("Tags"), "Edm.String");
    let expr = odex::bind_expression(&node, &mut context(PRODUCT)).unwrap();
    assert!(expr.type_ref().nullable);
    assert_eq!(expr.evaluate().unwrap(), Value::Null);
}

#[test]
fn test_cast_navigation_to_primitive_is_null() {
    let clause = filter(QueryNode::eq(
        QueryNode::cast(QueryNode::prop("Category"), "Edm.Int32"),
        QueryNode::null(),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_isof_primitive_on_resource_is_false() {
    let explicit = filter(QueryNode::is_of(QueryNode::prop("Category"), "Edm.Int32"));
    assert!(matching_ids(&explicit, &mut context(PRODUCT)).is_empty());

    let implicit = filter(QueryNode::IsOf {
        source: None,
        type_name: "Edm.Int32".into(),
    });
    assert!(matching_ids(&implicit, &mut context(PRODUCT)).is_empty());
}

#[test]
fn test_cast_to_unknown_type_rejected() {
    let node = QueryNode::cast(QueryNode::prop("Name"), "Edm.Nope");
    let err = odex::bind_expression(&node, &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::InvalidCast(_)));
}

// -------------------------------------------------------------------------
// Properties
// -------------------------------------------------------------------------

#[test]
fn test_unknown_property_rejected() {
    let clause = filter(QueryNode::eq(QueryNode::prop("Nope"), QueryNode::constant(1)));
    let err = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert_eq!(
        bind_error(&err),
        &BindError::PropertyNotFound {
            type_name: PRODUCT.into(),
            property: "Nope".into(),
        }
    );
}

#[test]
fn test_open_type_property_is_dynamic() {
    let clause = filter(QueryNode::eq(QueryNode::prop("Tier"), QueryNode::constant("Gold")));
    let predicate = bind_filter(Some(&clause), &mut context(CUSTOMER)).unwrap();

    let gold = Value::resource(Record::new(CUSTOMER).with("Id", 1).with_dynamic("Tier", "Gold"));
    let plain = Value::resource(Record::new(CUSTOMER).with("Id", 2));
    assert!(predicate.test(&gold).unwrap());
    assert!(!predicate.test(&plain).unwrap());
}

#[test]
fn test_dynamic_property_on_closed_type_rejected() {
    let node = QueryNode::it().dynamic("Tier");
    let err = odex::bind_expression(&node, &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::PropertyNotFound { .. }));
}

#[test]
fn test_missing_clause_is_argument_null() {
    let err = bind_filter(None, &mut context(PRODUCT)).unwrap_err();
    assert_eq!(bind_error(&err), &BindError::ArgumentNull("filter".into()));
}

// -------------------------------------------------------------------------
// Functions
// -------------------------------------------------------------------------

#[test]
fn test_builtin_string_function() {
    let clause = filter(QueryNode::call(
        "contains",
        vec![QueryNode::prop("Name"), QueryNode::constant("an")],
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![2]);
}

#[test]
fn test_builtin_with_wrong_argument_types_rejected() {
    let clause = filter(QueryNode::call(
        "contains",
        vec![QueryNode::prop("Id"), QueryNode::constant("1")],
    ));
    let err = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::IncompatibleOperandTypes(_)));
}

#[test]
fn test_unknown_function_rejected() {
    let clause = filter(QueryNode::call("frobnicate", vec![QueryNode::prop("Name")]));
    let err = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert_eq!(bind_error(&err), &BindError::UnknownFunction("frobnicate".into()));
}

fn padright() -> HostFunction {
    HostFunction::new("padright", |args: &[Value]| {
        let text = args[0].as_string().unwrap_or_default();
        let width = usize::try_from(args[1].as_int64().unwrap_or_default()).unwrap_or_default();
        Ok(Value::String(format!("{text:<width$}")))
    })
}

#[test]
fn test_custom_function_round_trip() {
    let function = padright();
    register_function(
        "padright",
        FunctionSignature::new(vec![TypeRef::string(), TypeRef::int32()], TypeRef::string()),
        function.clone(),
    );

    let clause = filter(QueryNode::eq(
        QueryNode::call("padright", vec![QueryNode::prop("Name"), QueryNode::constant(6)]),
        QueryNode::constant("Chai  "),
    ));
    assert_eq!(matching_ids(&clause, &mut context(PRODUCT)), vec![1]);

    assert!(unregister_function("padright", &function));
    let err = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert_eq!(bind_error(&err), &BindError::UnknownFunction("padright".into()));
}

#[test]
fn test_custom_function_overloads_by_argument_type() {
    let registry = Arc::new(FunctionRegistry::new());
    let as_text = HostFunction::new("describe", |_: &[Value]| Ok(Value::from("text")));
    let as_number = HostFunction::new("describe", |_: &[Value]| Ok(Value::from("number")));
    registry.register(
        "describe",
        FunctionSignature::new(vec![TypeRef::string()], TypeRef::string()),
        as_text,
    );
    registry.register(
        "describe",
        FunctionSignature::new(
            vec![TypeRef::primitive(odex::types::PrimitiveKind::Int64, false)],
            TypeRef::string(),
        ),
        as_number,
    );

    let mut ctx = context(PRODUCT).with_function_registry(registry);
    let clause = filter(QueryNode::eq(
        QueryNode::call("describe", vec![QueryNode::prop("Quantity")]),
        QueryNode::constant("number"),
    ));
    // Int32 widens to the Int64 overload
    assert_eq!(matching_ids(&clause, &mut ctx), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_custom_overload_does_not_hide_builtin() {
    let registry = Arc::new(FunctionRegistry::new());
    registry.register(
        "substring",
        FunctionSignature::new(vec![TypeRef::string(), TypeRef::string()], TypeRef::string()),
        HostFunction::new("substring", |_: &[Value]| Ok(Value::from("custom"))),
    );
    let mut ctx = context(PRODUCT).with_function_registry(registry);

    let builtin = filter(QueryNode::eq(
        QueryNode::call("substring", vec![QueryNode::prop("Name"), QueryNode::constant(1)]),
        QueryNode::constant("hai"),
    ));
    assert_eq!(matching_ids(&builtin, &mut ctx), vec![1]);

    let custom = filter(QueryNode::eq(
        QueryNode::call("substring", vec![QueryNode::prop("Name"), QueryNode::constant("x")]),
        QueryNode::constant("custom"),
    ));
    assert_eq!(matching_ids(&custom, &mut ctx), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_custom_function_without_matching_overload_rejected() {
    let registry = Arc::new(FunctionRegistry::new());
    registry.register(
        "shout",
        FunctionSignature::new(vec![TypeRef::string()], TypeRef::string()),
        HostFunction::new("shout", |args: &[Value]| Ok(args[0].clone())),
    );
    let mut ctx = context(PRODUCT).with_function_registry(registry);
    let clause = filter(QueryNode::eq(
        QueryNode::call("shout", vec![QueryNode::prop("Tags")]),
        QueryNode::constant("x"),
    ));
    let err = bind_filter(Some(&clause), &mut ctx).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::IncompatibleOperandTypes(_)));
}

#[test]
fn test_isolated_registry_does_not_see_global_functions() {
    let function = HostFunction::new("shout", |args: &[Value]| Ok(args[0].clone()));
    let registry = Arc::new(FunctionRegistry::new());
    registry.register(
        "shout",
        FunctionSignature::new(vec![TypeRef::string()], TypeRef::string()),
        function,
    );
    let clause = filter(QueryNode::eq(
        QueryNode::call("shout", vec![QueryNode::prop("Name")]),
        QueryNode::constant("Chai"),
    ));
    let err = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::UnknownFunction(_)));

    let mut ctx = context(PRODUCT).with_function_registry(registry);
    assert_eq!(matching_ids(&clause, &mut ctx), vec![1]);
}

// -------------------------------------------------------------------------
// Date and time functions
// -------------------------------------------------------------------------

/// `name(property) eq expected` over the sample events.
fn component_eq(name: &str, property: &str, expected: impl Into<Value>) -> Vec<i32> {
    let clause = filter(QueryNode::eq(
        QueryNode::call(name, vec![QueryNode::prop(property)]),
        QueryNode::constant(expected),
    ));
    matching_events(&clause, &mut context(EVENT))
}

#[test]
fn test_date_components_of_datetimeoffset() {
    assert_eq!(component_eq("year", "Starts", 2024), vec![1, 3]);
    assert_eq!(component_eq("month", "Starts", 12), vec![2]);
    assert_eq!(component_eq("day", "Starts", 4), vec![3]);
}

#[test]
fn test_time_components_use_local_offset() {
    assert_eq!(component_eq("hour", "Starts", 9), vec![1]);
    assert_eq!(component_eq("hour", "Starts", 12), vec![3]);
    assert_eq!(component_eq("minute", "Starts", 30), vec![1]);
    assert_eq!(component_eq("second", "Starts", 59), vec![2]);
}

#[test]
fn test_date_components_of_date() {
    // event 3 has no day; the comparison against null is false
    assert_eq!(component_eq("year", "Day", 2024), vec![1]);
    assert_eq!(component_eq("month", "Day", 12), vec![2]);
    assert_eq!(component_eq("day", "Day", 15), vec![1]);
}

#[test]
fn test_time_components_of_time_of_day() {
    assert_eq!(component_eq("hour", "Opens", 8), vec![1]);
    assert_eq!(component_eq("minute", "Opens", 0), vec![2, 3]);
    assert_eq!(component_eq("second", "Opens", 30), vec![1]);
}

#[test]
fn test_fractional_seconds_keeps_seven_digits() {
    assert_eq!(
        component_eq("fractionalseconds", "Starts", Decimal::new(1_234_567, 7)),
        vec![1]
    );
    assert_eq!(component_eq("fractionalseconds", "Starts", Decimal::new(5, 1)), vec![3]);
    assert_eq!(component_eq("fractionalseconds", "Starts", Decimal::ZERO), vec![2]);
    assert_eq!(component_eq("fractionalseconds", "Opens", Decimal::new(25, 2)), vec![1]);
    assert_eq!(component_eq("fractionalseconds", "Opens", Decimal::new(1, 6)), vec![3]);
}

#[test]
fn test_date_and_time_extraction() {
    let same_day = filter(QueryNode::eq(
        QueryNode::call("date", vec![QueryNode::prop("Starts")]),
        QueryNode::prop("Day"),
    ));
    assert_eq!(matching_events(&same_day, &mut context(EVENT)), vec![1, 2]);

    assert_eq!(component_eq("date", "Starts", date(2024, 7, 4)), vec![3]);
    assert_eq!(
        component_eq("time", "Starts", Value::TimeOfDay(time(12, 0, 0, 500_000_000))),
        vec![3]
    );
}

#[test]
fn test_offset_and_duration_totals() {
    assert_eq!(component_eq("totaloffsetminutes", "Starts", 120), vec![1]);
    assert_eq!(component_eq("totaloffsetminutes", "Starts", -300), vec![3]);
    assert_eq!(component_eq("totalseconds", "Length", Decimal::new(9025, 2)), vec![1]);

    let long = filter(QueryNode::gt(
        QueryNode::call("totalseconds", vec![QueryNode::prop("Length")]),
        QueryNode::constant(3600),
    ));
    assert_eq!(matching_events(&long, &mut context(EVENT)), vec![2]);
}

#[test]
fn test_datetime_bounds_and_now() {
    let bounded = filter(QueryNode::and(
        QueryNode::gt(QueryNode::prop("Starts"), QueryNode::call("mindatetime", Vec::new())),
        QueryNode::lt(QueryNode::prop("Starts"), QueryNode::call("maxdatetime", Vec::new())),
    ));
    assert_eq!(matching_events(&bounded, &mut context(EVENT)), vec![1, 2, 3]);

    let past = filter(QueryNode::lt(
        QueryNode::prop("Starts"),
        QueryNode::call("now", Vec::new()),
    ));
    assert_eq!(matching_events(&past, &mut context(EVENT)), vec![1, 2, 3]);

    let fixed = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
    let after = filter(QueryNode::gt(QueryNode::prop("Starts"), QueryNode::constant(fixed)));
    assert_eq!(matching_events(&after, &mut context(EVENT)), vec![1, 3]);
}

#[test]
fn test_component_of_wrong_kind_rejected() {
    let clause = filter(QueryNode::eq(
        QueryNode::call("year", vec![QueryNode::prop("Opens")]),
        QueryNode::constant(2024),
    ));
    let err = bind_filter(Some(&clause), &mut context(EVENT)).unwrap_err();
    assert!(matches!(bind_error(&err), BindError::IncompatibleOperandTypes(_)));
}

// -------------------------------------------------------------------------
// Constants and determinism
// -------------------------------------------------------------------------

#[test]
fn test_identical_literals_share_one_cell() {
    let mut ctx = context(PRODUCT);
    let clause = filter(QueryNode::or(
        QueryNode::eq(QueryNode::prop("Id"), QueryNode::constant(1)),
        QueryNode::eq(QueryNode::prop("Quantity"), QueryNode::constant(1)),
    ));
    bind_filter(Some(&clause), &mut ctx).unwrap();
    assert_eq!(ctx.constant_count(), 1);
}

#[test]
fn test_parameterization_can_be_disabled() {
    let settings = QuerySettings::new().with_constant_parameterization(false);
    let mut ctx = context_with(PRODUCT, settings);
    let clause = filter(QueryNode::eq(QueryNode::prop("Id"), QueryNode::constant(1)));
    bind_filter(Some(&clause), &mut ctx).unwrap();
    assert_eq!(ctx.constant_count(), 0);
}

#[test]
fn test_plan_key_ignores_constant_values() {
    let bind = |id: i32| {
        let clause = filter(QueryNode::eq(QueryNode::prop("Id"), QueryNode::constant(id)));
        bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap()
    };
    let (one, two) = (bind(1), bind(2));
    assert_ne!(one, two);
    assert_eq!(one.plan_key(), two.plan_key());
}

#[test]
fn test_compilation_is_deterministic() {
    let clause = filter(QueryNode::and(
        QueryNode::eq(QueryNode::prop("Category").property("Name"), QueryNode::constant("Produce")),
        QueryNode::any(
            QueryNode::prop("Orders"),
            "o",
            QueryNode::gt(QueryNode::range("o").property("Amount"), QueryNode::constant(40)),
        ),
    ));
    let first = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap();
    let second = bind_filter(Some(&clause), &mut context(PRODUCT)).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.plan_key(), second.plan_key());
    assert!(first.is_closed());
}
