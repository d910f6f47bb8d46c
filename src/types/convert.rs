//! Value conversions between primitive and enum kinds.
//!
//! `convert` returns None when a conversion is undefined for the pair or
//! the value does not fit the target; callers decide whether that is a
//! typed null (explicit casts) or an error (compiler-inserted promotions).

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::data_type::{PrimitiveKind, TypeKind};
use super::value::{EnumValue, Value};

/// Member table of an enum type, used by enum conversions.
pub trait EnumMembers {
    /// Returns the value of a named member.
    fn member_value(&self, name: &str) -> Option<i64>;
    /// Returns the name of the member with the given value.
    fn member_name(&self, value: i64) -> Option<&str>;
}

/// Converts `value` to the target kind.
#[must_use]
pub fn convert(value: &Value, target: &TypeKind, members: Option<&dyn EnumMembers>) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match target {
        TypeKind::Untyped => Some(value.clone()),
        TypeKind::Primitive(kind) => convert_primitive(value, *kind, members),
        TypeKind::Enum(name) => convert_enum(value, name, members),
        TypeKind::Entity(name) | TypeKind::Complex(name) => match value {
            Value::Resource(r) if r.type_name() == name => Some(value.clone()),
            _ => None,
        },
        TypeKind::Collection(_) | TypeKind::Record(_) => None,
    }
}

fn convert_enum(value: &Value, type_name: &str, members: Option<&dyn EnumMembers>) -> Option<Value> {
    let number = match value {
        Value::Enum(v) if v.type_name == type_name => return Some(value.clone()),
        Value::String(s) => {
            let members = members?;
            let mut combined = 0;
            for part in s.split(',') {
                combined |= members.member_value(part.trim())?;
            }
            combined
        }
        other => other.as_int64()?,
    };
    Some(Value::Enum(EnumValue {
        type_name: type_name.to_string(),
        value: number,
    }))
}

#[allow(clippy::cast_precision_loss)]
fn convert_primitive(value: &Value, kind: PrimitiveKind, members: Option<&dyn EnumMembers>) -> Option<Value> {
    if value.primitive_kind() == Some(kind) {
        return Some(value.clone());
    }
    if let Value::String(s) = value {
        return parse_string(s, kind);
    }
    if let Value::Enum(e) = value {
        return match kind {
            PrimitiveKind::String => members
                .and_then(|m| m.member_name(e.value))
                .map(|name| Value::String(name.to_string())),
            _ if kind.is_integral() => convert_primitive(&Value::Int64(e.value), kind, None),
            _ => None,
        };
    }
    match kind {
        PrimitiveKind::String => to_string(value).map(Value::String),
        PrimitiveKind::Boolean => None,
        PrimitiveKind::Byte => integral(value).and_then(|v| u8::try_from(v).ok()).map(Value::Byte),
        PrimitiveKind::SByte => integral(value).and_then(|v| i8::try_from(v).ok()).map(Value::SByte),
        PrimitiveKind::Int16 => integral(value).and_then(|v| i16::try_from(v).ok()).map(Value::Int16),
        PrimitiveKind::Int32 => integral(value).and_then(|v| i32::try_from(v).ok()).map(Value::Int32),
        PrimitiveKind::Int64 => integral(value).map(Value::Int64),
        PrimitiveKind::Single => {
            if value.primitive_kind().is_some_and(|k| k.is_numeric()) {
                value.as_float64().map(|v| Value::Single(v as f32))
            } else {
                None
            }
        }
        PrimitiveKind::Double => {
            if value.primitive_kind().is_some_and(|k| k.is_numeric()) {
                value.as_float64().map(Value::Double)
            } else {
                None
            }
        }
        PrimitiveKind::Decimal => {
            if value.primitive_kind().is_some_and(|k| k.is_numeric()) {
                value.as_decimal().map(Value::Decimal)
            } else {
                None
            }
        }
        PrimitiveKind::DateTimeOffset => match value {
            Value::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(|dt| Value::DateTimeOffset(Utc.from_utc_datetime(&dt).fixed_offset())),
            _ => None,
        },
        PrimitiveKind::Date => match value {
            Value::DateTimeOffset(dt) => Some(Value::Date(dt.date_naive())),
            _ => None,
        },
        PrimitiveKind::TimeOfDay => match value {
            Value::DateTimeOffset(dt) => Some(Value::TimeOfDay(dt.time())),
            _ => None,
        },
        PrimitiveKind::Guid | PrimitiveKind::Duration | PrimitiveKind::Binary => None,
    }
}

/// Integral view of a numeric value; floating values truncate toward zero.
fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Single(v) => f64::from(*v).trunc().to_i64(),
        Value::Double(v) => v.trunc().to_i64(),
        Value::Decimal(v) => v.trunc().to_i64(),
        other => other.as_int64(),
    }
}

fn to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::Boolean(v) => v.to_string(),
        Value::Byte(v) => v.to_string(),
        Value::SByte(v) => v.to_string(),
        Value::Int16(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Single(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Guid(v) => v.to_string(),
        Value::Date(v) => v.format("%Y-%m-%d").to_string(),
        Value::TimeOfDay(v) => v.format("%H:%M:%S%.f").to_string(),
        Value::DateTimeOffset(v) => v.to_rfc3339(),
        _ => return None,
    };
    Some(text)
}

fn parse_string(s: &str, kind: PrimitiveKind) -> Option<Value> {
    let value = match kind {
        PrimitiveKind::String => Value::String(s.to_string()),
        PrimitiveKind::Boolean => Value::Boolean(bool::from_str(s).ok()?),
        PrimitiveKind::Byte => Value::Byte(s.parse().ok()?),
        PrimitiveKind::SByte => Value::SByte(s.parse().ok()?),
        PrimitiveKind::Int16 => Value::Int16(s.parse().ok()?),
        PrimitiveKind::Int32 => Value::Int32(s.parse().ok()?),
        PrimitiveKind::Int64 => Value::Int64(s.parse().ok()?),
        PrimitiveKind::Single => Value::Single(s.parse().ok()?),
        PrimitiveKind::Double => Value::Double(s.parse().ok()?),
        PrimitiveKind::Decimal => Value::Decimal(Decimal::from_str(s).ok()?),
        PrimitiveKind::Guid => Value::Guid(Uuid::parse_str(s).ok()?),
        PrimitiveKind::Date => Value::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?),
        PrimitiveKind::TimeOfDay => Value::TimeOfDay(NaiveTime::from_str(s).ok()?),
        PrimitiveKind::DateTimeOffset => Value::DateTimeOffset(DateTime::parse_from_rfc3339(s).ok()?),
        PrimitiveKind::Duration | PrimitiveKind::Binary => return None,
    };
    Some(value)
}
