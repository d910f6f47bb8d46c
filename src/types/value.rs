//! Runtime values.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{OdexError, Result};

use super::bag::{GroupResult, Grouping, PropertyBag};
use super::data_type::{PrimitiveKind, TypeRef};
use super::record::Record;

/// An enum member value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    /// Qualified enum type name.
    pub type_name: String,
    /// Underlying integer value (flags are OR-ed together).
    pub value: i64,
}

/// Runtime value container.
///
/// Equality and hashing treat floating values by canonical bit pattern:
/// `-0.0` equals `0.0` and every NaN equals every other NaN, so values
/// can key hash maps (group partitions, the constant cache).
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    Boolean(bool),
    Byte(u8),
    SByte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Guid(Uuid),
    Date(NaiveDate),
    TimeOfDay(NaiveTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Duration(Duration),
    Binary(Vec<u8>),
    Enum(EnumValue),
    /// Entity or complex instance.
    Resource(Arc<Record>),
    /// Collection of values.
    Collection(Arc<Vec<Value>>),
    /// Projection result.
    Bag(Arc<PropertyBag>),
    /// Aggregation result (group key plus aggregates).
    Group(Arc<GroupResult>),
    /// Intermediate partition produced by a group-by.
    Grouping(Arc<Grouping>),
}

fn canonical_f32(v: f32) -> u32 {
    if v.is_nan() {
        f32::NAN.to_bits()
    } else if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

fn canonical_f64(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::SByte(a), Value::SByte(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Single(a), Value::Single(b)) => canonical_f32(*a) == canonical_f32(*b),
            (Value::Double(a), Value::Double(b)) => canonical_f64(*a) == canonical_f64(*b),
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Guid(a), Value::Guid(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::TimeOfDay(a), Value::TimeOfDay(b)) => a == b,
            (Value::DateTimeOffset(a), Value::DateTimeOffset(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Resource(a), Value::Resource(b)) => a == b,
            (Value::Collection(a), Value::Collection(b)) => a == b,
            (Value::Bag(a), Value::Bag(b)) => a == b,
            (Value::Group(a), Value::Group(b)) => a == b,
            (Value::Grouping(a), Value::Grouping(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Byte(v) => v.hash(state),
            Value::SByte(v) => v.hash(state),
            Value::Int16(v) => v.hash(state),
            Value::Int32(v) => v.hash(state),
            Value::Int64(v) => v.hash(state),
            Value::Single(v) => canonical_f32(*v).hash(state),
            Value::Double(v) => canonical_f64(*v).hash(state),
            Value::Decimal(v) => v.hash(state),
            Value::String(v) => v.hash(state),
            Value::Guid(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::TimeOfDay(v) => v.hash(state),
            Value::DateTimeOffset(v) => v.hash(state),
            Value::Duration(v) => v.hash(state),
            Value::Binary(v) => v.hash(state),
            Value::Enum(v) => v.hash(state),
            Value::Resource(v) => v.hash(state),
            Value::Collection(v) => v.hash(state),
            Value::Bag(v) => v.hash(state),
            Value::Group(v) => v.hash(state),
            Value::Grouping(v) => v.hash(state),
        }
    }
}

impl Value {
    /// Creates a collection value.
    #[must_use]
    pub fn collection(items: Vec<Value>) -> Self {
        Value::Collection(Arc::new(items))
    }

    /// Creates a resource value.
    #[must_use]
    pub fn resource(record: Record) -> Self {
        Value::Resource(Arc::new(record))
    }

    /// Creates an enum value.
    #[must_use]
    pub fn enumeration(type_name: impl Into<String>, value: i64) -> Self {
        Value::Enum(EnumValue {
            type_name: type_name.into(),
            value,
        })
    }

    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the runtime type name used by type tests.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Enum(v) => &v.type_name,
            Value::Resource(r) => r.type_name(),
            Value::Collection(_) => "Collection",
            Value::Bag(_) | Value::Group(_) => "Record",
            Value::Grouping(_) => "Grouping",
            other => other
                .primitive_kind()
                .map_or("Edm.Untyped", |kind| kind.name()),
        }
    }

    /// Returns the primitive kind of a scalar value.
    #[must_use]
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        let kind = match self {
            Value::Boolean(_) => PrimitiveKind::Boolean,
            Value::Byte(_) => PrimitiveKind::Byte,
            Value::SByte(_) => PrimitiveKind::SByte,
            Value::Int16(_) => PrimitiveKind::Int16,
            Value::Int32(_) => PrimitiveKind::Int32,
            Value::Int64(_) => PrimitiveKind::Int64,
            Value::Single(_) => PrimitiveKind::Single,
            Value::Double(_) => PrimitiveKind::Double,
            Value::Decimal(_) => PrimitiveKind::Decimal,
            Value::String(_) => PrimitiveKind::String,
            Value::Guid(_) => PrimitiveKind::Guid,
            Value::Date(_) => PrimitiveKind::Date,
            Value::TimeOfDay(_) => PrimitiveKind::TimeOfDay,
            Value::DateTimeOffset(_) => PrimitiveKind::DateTimeOffset,
            Value::Duration(_) => PrimitiveKind::Duration,
            Value::Binary(_) => PrimitiveKind::Binary,
            _ => return None,
        };
        Some(kind)
    }

    /// Infers the static type of a literal value.
    ///
    /// Null infers as the dynamic type.
    #[must_use]
    pub fn infer_type(&self) -> TypeRef {
        if let Some(kind) = self.primitive_kind() {
            return TypeRef::primitive(kind, false);
        }
        match self {
            Value::Enum(v) => TypeRef::enumeration(v.type_name.clone()).with_nullable(false),
            Value::Resource(r) => TypeRef::entity(r.type_name()),
            Value::Collection(items) => {
                let element = items
                    .iter()
                    .find(|v| !v.is_null())
                    .map_or_else(TypeRef::untyped, Value::infer_type);
                TypeRef::collection(element)
            }
            _ => TypeRef::untyped(),
        }
    }

    /// Attempts to extract a bool value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integral value, widened to i64.
    #[must_use]
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::SByte(v) => Some(i64::from(*v)),
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::Enum(v) => Some(v.value),
            _ => None,
        }
    }

    /// Attempts to extract a numeric value as f64.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Value::Single(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Decimal(v) => rust_decimal::prelude::ToPrimitive::to_f64(v),
            other => other.as_int64().map(|v| v as f64),
        }
    }

    /// Attempts to extract a numeric value as a decimal.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(v) => Some(*v),
            Value::Single(v) => Decimal::from_f32_retain(*v),
            Value::Double(v) => Decimal::from_f64_retain(*v),
            other => other.as_int64().map(Decimal::from),
        }
    }

    /// Attempts to extract a string reference.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Attempts to extract a resource.
    #[must_use]
    pub fn as_resource(&self) -> Option<&Record> {
        match self {
            Value::Resource(r) => Some(r),
            _ => None,
        }
    }

    /// Attempts to extract a collection.
    #[must_use]
    pub fn as_collection(&self) -> Option<&[Value]> {
        match self {
            Value::Collection(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Attempts to extract a projection result.
    #[must_use]
    pub fn as_bag(&self) -> Option<&PropertyBag> {
        match self {
            Value::Bag(bag) => Some(bag),
            _ => None,
        }
    }

    /// Attempts to extract an aggregation result.
    #[must_use]
    pub fn as_group(&self) -> Option<&GroupResult> {
        match self {
            Value::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Reads a named member of a resource, projection or aggregation result.
    ///
    /// Declared-but-unset resource properties read as null.
    ///
    /// # Errors
    ///
    /// Returns `NullReference` when the value is null and
    /// `InvalidExpression` when the value has no members.
    pub fn member(&self, name: &str) -> Result<Value> {
        match self {
            Value::Resource(record) => Ok(record.get(name).cloned().unwrap_or(Value::Null)),
            Value::Bag(bag) => Ok(bag.get(name).unwrap_or(Value::Null)),
            Value::Group(group) => Ok(group.get(name).unwrap_or(Value::Null)),
            Value::Null => Err(OdexError::NullReference(format!(
                "cannot read '{name}' of a null value"
            ))),
            other => Err(OdexError::InvalidExpression(format!(
                "cannot read '{name}' of a {} value",
                other.type_name()
            ))),
        }
    }

    /// Compares two values of the same kind.
    ///
    /// Returns None if either value is null or the kinds don't match.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Byte(a), Value::Byte(b)) => Some(a.cmp(b)),
            (Value::SByte(a), Value::SByte(b)) => Some(a.cmp(b)),
            (Value::Int16(a), Value::Int16(b)) => Some(a.cmp(b)),
            (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Single(a), Value::Single(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Guid(a), Value::Guid(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::TimeOfDay(a), Value::TimeOfDay(b)) => Some(a.cmp(b)),
            (Value::DateTimeOffset(a), Value::DateTimeOffset(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            (Value::Enum(a), Value::Enum(b)) if a.type_name == b.type_name => {
                Some(a.value.cmp(&b.value))
            }
            // Null or kind mismatch
            _ => None,
        }
    }

    /// Total order used for sorting: null first, then same-kind comparison.
    ///
    /// Values of different kinds (only possible for dynamic properties) fall
    /// back to a numeric comparison when both are numeric, otherwise to the
    /// order of their type names.
    #[must_use]
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        if let Some(ordering) = self.compare(other) {
            return ordering;
        }
        if let (Some(a), Some(b)) = (self.as_decimal(), other.as_decimal()) {
            return a.cmp(&b);
        }
        self.type_name().cmp(other.type_name())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTimeOffset(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::resource(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::collection(v.into_iter().map(Into::into).collect())
    }
}
