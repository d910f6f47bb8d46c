//! Built-in query functions.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;

use crate::error::{OdexError, Result};
use crate::types::Value;

/// Canonical functions available without registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Contains,
    StartsWith,
    EndsWith,
    Length,
    IndexOf,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    FractionalSeconds,
    Date,
    Time,
    TotalOffsetMinutes,
    TotalSeconds,
    Now,
    MinDateTime,
    MaxDateTime,
    Round,
    Floor,
    Ceiling,
}

impl BuiltinFunction {
    pub const ALL: [BuiltinFunction; 27] = [
        BuiltinFunction::Contains,
        BuiltinFunction::StartsWith,
        BuiltinFunction::EndsWith,
        BuiltinFunction::Length,
        BuiltinFunction::IndexOf,
        BuiltinFunction::Substring,
        BuiltinFunction::ToLower,
        BuiltinFunction::ToUpper,
        BuiltinFunction::Trim,
        BuiltinFunction::Concat,
        BuiltinFunction::Year,
        BuiltinFunction::Month,
        BuiltinFunction::Day,
        BuiltinFunction::Hour,
        BuiltinFunction::Minute,
        BuiltinFunction::Second,
        BuiltinFunction::FractionalSeconds,
        BuiltinFunction::Date,
        BuiltinFunction::Time,
        BuiltinFunction::TotalOffsetMinutes,
        BuiltinFunction::TotalSeconds,
        BuiltinFunction::Now,
        BuiltinFunction::MinDateTime,
        BuiltinFunction::MaxDateTime,
        BuiltinFunction::Round,
        BuiltinFunction::Floor,
        BuiltinFunction::Ceiling,
    ];

    /// Resolves a built-in by its query-language name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFunction::Contains => "contains",
            BuiltinFunction::StartsWith => "startswith",
            BuiltinFunction::EndsWith => "endswith",
            BuiltinFunction::Length => "length",
            BuiltinFunction::IndexOf => "indexof",
            BuiltinFunction::Substring => "substring",
            BuiltinFunction::ToLower => "tolower",
            BuiltinFunction::ToUpper => "toupper",
            BuiltinFunction::Trim => "trim",
            BuiltinFunction::Concat => "concat",
            BuiltinFunction::Year => "year",
            BuiltinFunction::Month => "month",
            BuiltinFunction::Day => "day",
            BuiltinFunction::Hour => "hour",
            BuiltinFunction::Minute => "minute",
            BuiltinFunction::Second => "second",
            BuiltinFunction::FractionalSeconds => "fractionalseconds",
            BuiltinFunction::Date => "date",
            BuiltinFunction::Time => "time",
            BuiltinFunction::TotalOffsetMinutes => "totaloffsetminutes",
            BuiltinFunction::TotalSeconds => "totalseconds",
            BuiltinFunction::Now => "now",
            BuiltinFunction::MinDateTime => "mindatetime",
            BuiltinFunction::MaxDateTime => "maxdatetime",
            BuiltinFunction::Round => "round",
            BuiltinFunction::Floor => "floor",
            BuiltinFunction::Ceiling => "ceiling",
        }
    }

    /// Applies the function to already-evaluated arguments.
    ///
    /// # Errors
    ///
    /// Returns `NullReference` when an argument is null and
    /// `InvalidExpression` when an argument has the wrong kind.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        if let Some(position) = args.iter().position(Value::is_null) {
            return Err(OdexError::NullReference(format!(
                "argument {position} of '{}' is null",
                self.name()
            )));
        }
        match self {
            BuiltinFunction::Contains => {
                Ok(Value::Boolean(self.string(args, 0)?.contains(self.string(args, 1)?)))
            }
            BuiltinFunction::StartsWith => Ok(Value::Boolean(
                self.string(args, 0)?.starts_with(self.string(args, 1)?),
            )),
            BuiltinFunction::EndsWith => Ok(Value::Boolean(
                self.string(args, 0)?.ends_with(self.string(args, 1)?),
            )),
            BuiltinFunction::Length => int32(self.string(args, 0)?.chars().count()),
            BuiltinFunction::IndexOf => {
                let haystack = self.string(args, 0)?;
                match haystack.find(self.string(args, 1)?) {
                    Some(byte_index) => int32(haystack[..byte_index].chars().count()),
                    None => Ok(Value::Int32(-1)),
                }
            }
            BuiltinFunction::Substring => {
                let text = self.string(args, 0)?;
                let start = self.integer(args, 1)?;
                let length = match args.get(2) {
                    Some(_) => Some(self.integer(args, 2)?),
                    None => None,
                };
                Ok(Value::String(substring(text, start, length)))
            }
            BuiltinFunction::ToLower => Ok(Value::String(self.string(args, 0)?.to_lowercase())),
            BuiltinFunction::ToUpper => Ok(Value::String(self.string(args, 0)?.to_uppercase())),
            BuiltinFunction::Trim => Ok(Value::String(self.string(args, 0)?.trim().to_string())),
            BuiltinFunction::Concat => Ok(Value::String(format!(
                "{}{}",
                self.string(args, 0)?,
                self.string(args, 1)?
            ))),
            BuiltinFunction::Year
            | BuiltinFunction::Month
            | BuiltinFunction::Day
            | BuiltinFunction::Hour
            | BuiltinFunction::Minute
            | BuiltinFunction::Second => self.component(self.first(args)?),
            BuiltinFunction::FractionalSeconds => {
                let nanos = match self.first(args)? {
                    Value::DateTimeOffset(dt) => dt.nanosecond(),
                    Value::TimeOfDay(t) => t.nanosecond(),
                    other => return Err(self.wrong_kind(other)),
                };
                Ok(Value::Decimal(Decimal::new(i64::from(nanos), 9).normalize()))
            }
            BuiltinFunction::Date => match self.first(args)? {
                Value::DateTimeOffset(dt) => Ok(Value::Date(dt.date_naive())),
                Value::Date(d) => Ok(Value::Date(*d)),
                other => Err(self.wrong_kind(other)),
            },
            BuiltinFunction::Time => match self.first(args)? {
                Value::DateTimeOffset(dt) => Ok(Value::TimeOfDay(dt.time())),
                Value::TimeOfDay(t) => Ok(Value::TimeOfDay(*t)),
                other => Err(self.wrong_kind(other)),
            },
            BuiltinFunction::TotalOffsetMinutes => match self.first(args)? {
                Value::DateTimeOffset(dt) => Ok(Value::Int32(dt.offset().local_minus_utc() / 60)),
                other => Err(self.wrong_kind(other)),
            },
            BuiltinFunction::TotalSeconds => match self.first(args)? {
                Value::Duration(d) => {
                    let seconds = match d.num_nanoseconds() {
                        Some(nanos) => Decimal::new(nanos, 9).normalize(),
                        None => Decimal::from(d.num_seconds()),
                    };
                    Ok(Value::Decimal(seconds))
                }
                other => Err(self.wrong_kind(other)),
            },
            BuiltinFunction::Now => Ok(Value::DateTimeOffset(Utc::now().fixed_offset())),
            BuiltinFunction::MinDateTime => Ok(Value::DateTimeOffset(utc(1, 1, 1, 0)?)),
            BuiltinFunction::MaxDateTime => {
                Ok(Value::DateTimeOffset(utc(9999, 12, 31, MAX_DATETIME_NANOS)?))
            }
            BuiltinFunction::Round | BuiltinFunction::Floor | BuiltinFunction::Ceiling => {
                self.rounding(self.first(args)?)
            }
        }
    }

    fn first<'a>(&self, args: &'a [Value]) -> Result<&'a Value> {
        args.first().ok_or_else(|| self.missing(0))
    }

    fn string<'a>(&self, args: &'a [Value], index: usize) -> Result<&'a str> {
        match args.get(index) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(self.wrong_kind(other)),
            None => Err(self.missing(index)),
        }
    }

    fn integer(&self, args: &[Value], index: usize) -> Result<i64> {
        match args.get(index) {
            Some(value) => value.as_int64().ok_or_else(|| self.wrong_kind(value)),
            None => Err(self.missing(index)),
        }
    }

    fn missing(&self, index: usize) -> OdexError {
        OdexError::InvalidExpression(format!("'{}' is missing argument {index}", self.name()))
    }

    fn wrong_kind(&self, value: &Value) -> OdexError {
        OdexError::InvalidExpression(format!(
            "'{}' is not defined for {}",
            self.name(),
            value.type_name()
        ))
    }

    fn component(&self, value: &Value) -> Result<Value> {
        let component = match (self, value) {
            (BuiltinFunction::Year, Value::Date(d)) => d.year(),
            (BuiltinFunction::Year, Value::DateTimeOffset(dt)) => dt.year(),
            (BuiltinFunction::Month, Value::Date(d)) => to_int32(d.month())?,
            (BuiltinFunction::Month, Value::DateTimeOffset(dt)) => to_int32(dt.month())?,
            (BuiltinFunction::Day, Value::Date(d)) => to_int32(d.day())?,
            (BuiltinFunction::Day, Value::DateTimeOffset(dt)) => to_int32(dt.day())?,
            (BuiltinFunction::Hour, Value::DateTimeOffset(dt)) => to_int32(dt.hour())?,
            (BuiltinFunction::Hour, Value::TimeOfDay(t)) => to_int32(t.hour())?,
            (BuiltinFunction::Minute, Value::DateTimeOffset(dt)) => to_int32(dt.minute())?,
            (BuiltinFunction::Minute, Value::TimeOfDay(t)) => to_int32(t.minute())?,
            (BuiltinFunction::Second, Value::DateTimeOffset(dt)) => to_int32(dt.second())?,
            (BuiltinFunction::Second, Value::TimeOfDay(t)) => to_int32(t.second())?,
            (_, other) => return Err(self.wrong_kind(other)),
        };
        Ok(Value::Int32(component))
    }

    fn rounding(&self, value: &Value) -> Result<Value> {
        Ok(match (self, value) {
            (BuiltinFunction::Round, Value::Double(v)) => Value::Double(v.round_ties_even()),
            (BuiltinFunction::Floor, Value::Double(v)) => Value::Double(v.floor()),
            (BuiltinFunction::Ceiling, Value::Double(v)) => Value::Double(v.ceil()),
            (BuiltinFunction::Round, Value::Single(v)) => Value::Single(v.round_ties_even()),
            (BuiltinFunction::Floor, Value::Single(v)) => Value::Single(v.floor()),
            (BuiltinFunction::Ceiling, Value::Single(v)) => Value::Single(v.ceil()),
            // Decimal::round uses banker's rounding, matching round_ties_even
            (BuiltinFunction::Round, Value::Decimal(v)) => Value::Decimal(v.round()),
            (BuiltinFunction::Floor, Value::Decimal(v)) => Value::Decimal(v.floor()),
            (BuiltinFunction::Ceiling, Value::Decimal(v)) => Value::Decimal(v.ceil()),
            (_, other) => return Err(self.wrong_kind(other)),
        })
    }
}

/// Sub-second part of `maxdatetime()`, seven fractional digits.
const MAX_DATETIME_NANOS: u32 = 999_999_900;

/// Midnight UTC on the given day, or the last representable instant of it
/// when `nanos` is non-zero.
fn utc(year: i32, month: u32, day: u32, nanos: u32) -> Result<DateTime<FixedOffset>> {
    let (h, m, s) = if nanos == 0 { (0, 0, 0) } else { (23, 59, 59) };
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_nano_opt(h, m, s, nanos))
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| OdexError::Overflow(format!("{year:04}-{month:02}-{day:02}")))
}

/// Date and time components always fit an `Edm.Int32`.
fn to_int32(component: u32) -> Result<i32> {
    i32::try_from(component).map_err(|_| OdexError::Overflow(component.to_string()))
}

fn int32(count: usize) -> Result<Value> {
    i32::try_from(count)
        .map(Value::Int32)
        .map_err(|_| OdexError::Overflow(format!("{count} does not fit Edm.Int32")))
}

/// Character-based substring that clamps out-of-range bounds instead of failing.
fn substring(text: &str, start: i64, length: Option<i64>) -> String {
    let start = usize::try_from(start.max(0)).unwrap_or(usize::MAX);
    let chars = text.chars().skip(start);
    match length {
        Some(length) => chars
            .take(usize::try_from(length.max(0)).unwrap_or(usize::MAX))
            .collect(),
        None => chars.collect(),
    }
}
