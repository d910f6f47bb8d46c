//! Shared model and data fixtures.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use odex::model::{EnumType, Model, NavigationProperty, StructuredType};
use odex::types::{PrimitiveKind, Record, TypeRef, Value};
use odex::{BinderContext, QuerySettings};
use rust_decimal::Decimal;

pub const PRODUCT: &str = "NS.Product";
pub const SPECIAL_PRODUCT: &str = "NS.SpecialProduct";
pub const CATEGORY: &str = "NS.Category";
pub const ORDER: &str = "NS.Order";
pub const ADDRESS: &str = "NS.Address";
pub const CUSTOMER: &str = "NS.Customer";
pub const COLOR: &str = "NS.Color";
pub const EVENT: &str = "NS.Event";

pub fn decimal() -> TypeRef {
    TypeRef::primitive(PrimitiveKind::Decimal, false)
}

pub fn nullable_double() -> TypeRef {
    TypeRef::primitive(PrimitiveKind::Double, true)
}

/// Category 1..* Product 1..* Order, a derived product type, a complex
/// address, a flags enum, an open customer type and a temporal event type.
pub fn sample_model() -> Arc<Model> {
    let mut model = Model::new();
    model
        .add_enum(EnumType::new(COLOR, &[("Red", 1), ("Green", 2), ("Blue", 4)]).flags())
        .expect("add enum");
    model
        .add_type(
            StructuredType::complex(ADDRESS)
                .with_property("City", TypeRef::string())
                .with_property("Zip", TypeRef::string()),
        )
        .expect("add address");
    model
        .add_type(
            StructuredType::entity(CATEGORY)
                .with_key(&["Id"])
                .with_property("Id", TypeRef::int32())
                .with_property("Name", TypeRef::string())
                .with_navigation(NavigationProperty::collection("Products", PRODUCT)),
        )
        .expect("add category");
    model
        .add_type(
            StructuredType::entity(PRODUCT)
                .with_key(&["Id"])
                .with_property("Id", TypeRef::int32())
                .with_property("Name", TypeRef::string())
                .with_property("Price", decimal())
                .with_property("Rating", nullable_double())
                .with_property("Quantity", TypeRef::int32())
                .with_property("Color", TypeRef::enumeration(COLOR))
                .with_property("Tags", TypeRef::collection(TypeRef::string()))
                .with_property("Origin", TypeRef::complex(ADDRESS))
                .with_navigation(NavigationProperty::single("Category", CATEGORY))
                .with_navigation(NavigationProperty::collection("Orders", ORDER)),
        )
        .expect("add product");
    model
        .add_type(
            StructuredType::entity(SPECIAL_PRODUCT)
                .derived_from(PRODUCT)
                .with_property("Discount", nullable_double()),
        )
        .expect("add special product");
    model
        .add_type(
            StructuredType::entity(ORDER)
                .with_key(&["Id"])
                .with_property("Id", TypeRef::int32())
                .with_property("Amount", decimal())
                .with_property("Quantity", TypeRef::int32())
                .with_concurrency_token("ETag", TypeRef::string())
                .with_property("ShipTo", TypeRef::complex(ADDRESS)),
        )
        .expect("add order");
    model
        .add_type(
            StructuredType::entity(CUSTOMER)
                .with_key(&["Id"])
                .with_property("Id", TypeRef::int32())
                .with_property("Name", TypeRef::string())
                .open(),
        )
        .expect("add customer");
    model
        .add_type(
            StructuredType::entity(EVENT)
                .with_key(&["Id"])
                .with_property("Id", TypeRef::int32())
                .with_property("Starts", TypeRef::primitive(PrimitiveKind::DateTimeOffset, false))
                .with_property("Day", TypeRef::primitive(PrimitiveKind::Date, true))
                .with_property("Opens", TypeRef::primitive(PrimitiveKind::TimeOfDay, false))
                .with_property("Length", TypeRef::primitive(PrimitiveKind::Duration, false)),
        )
        .expect("add event");
    Arc::new(model)
}

pub fn context(type_name: &str) -> BinderContext {
    BinderContext::new(sample_model(), type_name).expect("create context")
}

pub fn context_with(type_name: &str, settings: QuerySettings) -> BinderContext {
    context(type_name).with_settings(settings)
}

pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

pub fn category(id: i32, name: &str) -> Record {
    Record::new(CATEGORY).with("Id", id).with("Name", name)
}

pub fn product(id: i32, name: &str, price: i64) -> Record {
    Record::new(PRODUCT)
        .with("Id", id)
        .with("Name", name)
        .with("Price", dec(price))
        .with("Quantity", id * 10)
}

pub fn special_product(id: i32, name: &str, price: i64, discount: f64) -> Record {
    Record::new(SPECIAL_PRODUCT)
        .with("Id", id)
        .with("Name", name)
        .with("Price", dec(price))
        .with("Quantity", id * 10)
        .with("Discount", discount)
}

pub fn order(id: i32, amount: i64, quantity: i32) -> Record {
    Record::new(ORDER)
        .with("Id", id)
        .with("Amount", dec(amount))
        .with("Quantity", quantity)
        .with("ETag", format!("etag-{id}"))
}

pub fn address(city: &str, zip: &str) -> Record {
    Record::new(ADDRESS).with("City", city).with("Zip", zip)
}

pub fn orders(items: Vec<Record>) -> Value {
    Value::collection(items.into_iter().map(Value::resource).collect())
}

/// Five products over two categories; product 3 has no category, product
/// 5 is a special product.
pub fn sample_products() -> Vec<Value> {
    let beverages = Value::resource(category(1, "Beverages"));
    let produce = Value::resource(category(2, "Produce"));
    vec![
        Value::resource(
            product(1, "Chai", 18)
                .with("Category", beverages.clone())
                .with("Rating", 4.5)
                .with("Color", Value::enumeration(COLOR, 1))
                .with("Origin", address("Seattle", "98101"))
                .with("Orders", orders(vec![order(10, 36, 2), order(11, 18, 1)])),
        ),
        Value::resource(
            product(2, "Chang", 19)
                .with("Category", beverages)
                .with("Color", Value::enumeration(COLOR, 3))
                .with("Orders", orders(vec![order(12, 95, 5)])),
        ),
        Value::resource(
            product(3, "Aniseed Syrup", 10)
                .with("Rating", 3.0)
                .with("Color", Value::enumeration(COLOR, 4))
                .with("Orders", orders(Vec::new())),
        ),
        Value::resource(
            product(4, "Tofu", 23)
                .with("Category", produce.clone())
                .with("Color", Value::enumeration(COLOR, 2))
                .with("Origin", address("Tokyo", "100-0001"))
                .with("Orders", orders(vec![order(13, 23, 1), order(14, 46, 2), order(15, 69, 3)])),
        ),
        Value::resource(
            special_product(5, "Rössle Sauerkraut", 45, 0.1)
                .with("Category", produce)
                .with("Rating", 5.0)
                .with("Color", Value::enumeration(COLOR, 6))
                .with("Orders", orders(vec![order(16, 45, 1)])),
        ),
    ]
}

pub fn time(h: u32, m: u32, s: u32, nanos: u32) -> NaiveTime {
    NaiveTime::from_hms_nano_opt(h, m, s, nanos).expect("valid time")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Three events in different offsets; event 3 has no day.
pub fn sample_events() -> Vec<Value> {
    let starts = |text: &str| DateTime::parse_from_rfc3339(text).expect("valid timestamp");
    vec![
        Value::resource(
            Record::new(EVENT)
                .with("Id", 1)
                .with("Starts", starts("2024-03-15T09:30:45.1234567+02:00"))
                .with("Day", date(2024, 3, 15))
                .with("Opens", Value::TimeOfDay(time(8, 15, 30, 250_000_000)))
                .with("Length", Value::Duration(Duration::milliseconds(90_250))),
        ),
        Value::resource(
            Record::new(EVENT)
                .with("Id", 2)
                .with("Starts", starts("2023-12-31T23:59:59Z"))
                .with("Day", date(2023, 12, 31))
                .with("Opens", Value::TimeOfDay(time(17, 0, 0, 0)))
                .with("Length", Value::Duration(Duration::hours(2))),
        ),
        Value::resource(
            Record::new(EVENT)
                .with("Id", 3)
                .with("Starts", starts("2024-07-04T12:00:00.5-05:00"))
                .with("Opens", Value::TimeOfDay(time(12, 0, 0, 1_000)))
                .with("Length", Value::Duration(Duration::zero())),
        ),
    ]
}

/// Reads `name` from a resource, bag or group result.
pub fn member(value: &Value, name: &str) -> Value {
    value.member(name).expect("member access")
}

pub fn ids(values: &[Value]) -> Vec<i32> {
    values
        .iter()
        .map(|v| match member(v, "Id") {
            Value::Int32(id) => id,
            other => panic!("expected an Int32 Id, found {other:?}"),
        })
        .collect()
}
