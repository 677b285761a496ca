use chrono::{DateTime, NaiveDate};
use std::fmt;

/// Dynamically typed value carried by a change record.
///
/// Upstream connectors produce the raw kinds (`Null` through `Nested`), plus
/// `Decimal` for integers too large for `i64`. `Date` and `Timestamp` are
/// only produced by coercion against a declared column type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Structured value (object or array)
    Nested(serde_json::Value),
    /// Canonical decimal text with exactly `scale` fractional digits
    Decimal(String),
    /// Days since 1970-01-01
    Date(i32),
    /// Microseconds since the Unix epoch, UTC
    Timestamp(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value's kind, used in coercion diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int64(_) => "integer",
            Value::Float64(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Nested(_) => "nested",
            Value::Decimal(_) => "decimal",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Maps a JSON value onto the raw value kinds.
    ///
    /// Integers that fit in `i64` become `Int64`, larger unsigned integers
    /// keep their digits as `Decimal`, every other number becomes `Float64`.
    /// Arrays and objects are kept as `Nested`.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if n.as_u64().is_some() {
                    // exact digits; a float would lose precision
                    Value::Decimal(n.to_string())
                } else {
                    n.as_f64().map(Value::Float64).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Value::Nested(nested)
            }
        }
    }

    /// Output encoding used by the JSON-lines writer.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int64(i) => serde_json::Value::from(*i),
            // NaN and infinities have no JSON form
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) | Value::Decimal(s) => serde_json::Value::String(s.clone()),
            Value::Nested(json) => json.clone(),
            Value::Bytes(_) | Value::Date(_) | Value::Timestamp(_) => {
                serde_json::Value::String(self.to_string())
            }
        }
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn format_date(days: i32) -> String {
    NaiveDate::from_num_days_from_ce_opt(days.saturating_add(EPOCH_DAYS_FROM_CE))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| format!("date({})", days))
}

pub(crate) fn format_timestamp(micros: i64) -> String {
    DateTime::from_timestamp_micros(micros)
        .map(|ts| ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        .unwrap_or_else(|| format!("timestamp({})", micros))
}

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
pub(crate) const EPOCH_DAYS_FROM_CE: i32 = 719_163;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) | Value::Decimal(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "0x{}", hex(b)),
            Value::Nested(json) => write!(f, "{}", json),
            Value::Date(days) => write!(f, "{}", format_date(*days)),
            Value::Timestamp(micros) => write!(f, "{}", format_timestamp(*micros)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
