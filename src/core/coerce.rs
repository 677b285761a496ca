//! Conversion of raw change values into the declared type of a target column.
//!
//! `Null` coerces to `Null` for every type; enforcing NOT NULL is left to the
//! writer. Everything that cannot be represented in the declared type is a
//! [`CoercionError`].

use chrono::{Datelike, DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::core::error::CoercionError;
use crate::core::schema::{Column, DataType};
use crate::core::value::{hex, Value, EPOCH_DAYS_FROM_CE};

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const OFFSET_TIMESTAMP_FORMATS: [&str; 2] =
    ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Coerces `value` into the declared type of `column`.
pub fn coerce(column: &Column, value: &Value) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    convert(&column.data_type, value).map_err(|reason| CoercionError {
        column: column.name.clone(),
        expected: column.data_type.clone(),
        found: value.kind_name(),
        reason,
    })
}

fn convert(data_type: &DataType, value: &Value) -> Result<Value, String> {
    match data_type {
        DataType::Boolean => to_bool(value).map(Value::Bool),
        DataType::Int16 => to_int(value, i16::MIN as i64, i16::MAX as i64).map(Value::Int64),
        DataType::Int32 => to_int(value, i32::MIN as i64, i32::MAX as i64).map(Value::Int64),
        DataType::Int64 => to_int(value, i64::MIN, i64::MAX).map(Value::Int64),
        DataType::Float32 => {
            let f = to_float(value)?;
            if f.is_finite() && f.abs() > f32::MAX as f64 {
                return Err(format!("{} is out of range for FLOAT", f));
            }
            Ok(Value::Float64(f))
        }
        DataType::Float64 => to_float(value).map(Value::Float64),
        DataType::Decimal { precision, scale } => {
            let text = match value {
                Value::Int64(i) => i.to_string(),
                Value::Float64(f) if f.is_finite() => f.to_string(),
                Value::String(s) | Value::Decimal(s) => s.clone(),
                _ => return Err(unsupported(value)),
            };
            rescale_decimal(&text, *precision, *scale).map(Value::Decimal)
        }
        DataType::String => to_string(value).map(Value::String),
        DataType::Bytes => match value {
            Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
            Value::String(s) => Ok(Value::Bytes(s.as_bytes().to_vec())),
            _ => Err(unsupported(value)),
        },
        DataType::Json => match value {
            Value::Nested(json) => Ok(Value::Nested(json.clone())),
            Value::String(s) | Value::Decimal(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(Value::Nested)
                .map_err(|e| format!("invalid JSON: {}", e)),
            Value::Bool(_) | Value::Int64(_) | Value::Float64(_) => match value.to_json() {
                serde_json::Value::Null => Err("non-finite float has no JSON form".to_string()),
                json => Ok(Value::Nested(json)),
            },
            _ => Err(unsupported(value)),
        },
        DataType::Uuid => match value {
            Value::String(s) => parse_uuid(s).map(Value::String),
            Value::Bytes(b) if b.len() == 16 => {
                let h = hex(b);
                Ok(Value::String(format!(
                    "{}-{}-{}-{}-{}",
                    &h[0..8],
                    &h[8..12],
                    &h[12..16],
                    &h[16..20],
                    &h[20..32]
                )))
            }
            Value::Bytes(b) => Err(format!("expected 16 bytes, got {}", b.len())),
            _ => Err(unsupported(value)),
        },
        DataType::Date => match value {
            Value::Date(days) => Ok(Value::Date(*days)),
            Value::Int64(days) => i32::try_from(*days)
                .map(Value::Date)
                .map_err(|_| format!("{} days is out of range for DATE", days)),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(|d| Value::Date(days_since_epoch(d)))
                .map_err(|e| format!("invalid date '{}': {}", s, e)),
            _ => Err(unsupported(value)),
        },
        DataType::Timestamp => match value {
            Value::Timestamp(micros) | Value::Int64(micros) => Ok(Value::Timestamp(*micros)),
            Value::String(s) => parse_naive_timestamp(s.trim())
                .or_else(|| parse_offset_timestamp(s.trim()))
                .map(Value::Timestamp)
                .ok_or_else(|| format!("invalid timestamp '{}'", s)),
            _ => Err(unsupported(value)),
        },
        DataType::TimestampTz => match value {
            Value::Timestamp(micros) | Value::Int64(micros) => Ok(Value::Timestamp(*micros)),
            Value::String(s) => parse_offset_timestamp(s.trim())
                .map(Value::Timestamp)
                .ok_or_else(|| format!("invalid timestamp with time zone '{}'", s)),
            _ => Err(unsupported(value)),
        },
    }
}

fn unsupported(value: &Value) -> String {
    format!("{} values are not convertible to this type", value.kind_name())
}

fn to_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int64(0) => Ok(false),
        Value::Int64(1) => Ok(true),
        Value::Int64(i) => Err(format!("{} is not a boolean", i)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "t" | "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "f" | "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(format!("'{}' is not a boolean", s)),
        },
        _ => Err(unsupported(value)),
    }
}

fn to_int(value: &Value, min: i64, max: i64) -> Result<i64, String> {
    let i = match value {
        Value::Int64(i) => *i,
        Value::Float64(f) => {
            if !f.is_finite() || f.fract() != 0.0 || *f < i64::MIN as f64 || *f >= i64::MAX as f64 {
                return Err(format!("{} is not an integral value", f));
            }
            *f as i64
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|e| e.to_string())?,
        Value::Decimal(s) => s
            .parse::<i64>()
            .map_err(|_| format!("{} is out of range [{}, {}]", s, min, max))?,
        _ => return Err(unsupported(value)),
    };
    if i < min || i > max {
        return Err(format!("{} is out of range [{}, {}]", i, min, max));
    }
    Ok(i)
}

fn to_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Float64(f) => Ok(*f),
        Value::Int64(i) => Ok(*i as f64),
        Value::String(s) | Value::Decimal(s) => s.trim().parse::<f64>().map_err(|e| e.to_string()),
        _ => Err(unsupported(value)),
    }
}

fn to_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bytes(b) => String::from_utf8(b.clone()).map_err(|e| e.to_string()),
        Value::Nested(json) => Ok(json.to_string()),
        other => Ok(other.to_string()),
    }
}

fn parse_uuid(text: &str) -> Result<String, String> {
    let text = text.trim();
    let groups: Vec<&str> = text.split('-').collect();
    let well_formed = groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()));
    if !well_formed {
        return Err(format!("'{}' is not a UUID", text));
    }
    Ok(text.to_ascii_lowercase())
}

fn parse_naive_timestamp(text: &str) -> Option<i64> {
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|ts| ts.and_utc().timestamp_micros())
}

fn parse_offset_timestamp(text: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .or_else(|| {
            OFFSET_TIMESTAMP_FORMATS
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
        })
        .map(|ts| ts.with_timezone(&Utc).timestamp_micros())
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

/// Rescales decimal text to exactly `scale` fractional digits, rounding half
/// up, and checks the result fits in `precision` digits.
fn rescale_decimal(text: &str, precision: u8, scale: u8) -> Result<String, String> {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !digits_only(int_part) || !digits_only(frac_part) {
        return Err(format!("'{}' is not a decimal number", text));
    }

    let overflow = || format!("'{}' does not fit DECIMAL({},{})", text, precision, scale);
    let scale = scale as usize;
    let mut unscaled: i128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes().chain(std::iter::repeat(b'0')).take(scale)) {
        unscaled = unscaled
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i128))
            .ok_or_else(overflow)?;
    }
    if frac_part.as_bytes().get(scale).is_some_and(|b| *b >= b'5') {
        unscaled = unscaled.checked_add(1).ok_or_else(overflow)?;
    }

    let limit = 10i128.checked_pow(precision as u32).ok_or_else(overflow)?;
    if unscaled >= limit {
        return Err(overflow());
    }

    let factor = 10i128.checked_pow(scale as u32).ok_or_else(overflow)?;
    let sign = if negative && unscaled != 0 { "-" } else { "" };
    if scale == 0 {
        Ok(format!("{}{}", sign, unscaled))
    } else {
        Ok(format!(
            "{}{}.{:0width$}",
            sign,
            unscaled / factor,
            unscaled % factor,
            width = scale
        ))
    }
}
