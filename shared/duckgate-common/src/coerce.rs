//! Value coercion from wire scalars to engine-native values
//!
//! Dispatches on declared column type x value tag. Temporal columns accept an
//! ordered list of textual formats; the first one that parses wins, so a full
//! timestamp string can populate a DATE column by its date portion. Everything
//! non-temporal passes through unchanged and defers casting to the engine.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use duckdb::types::{TimeUnit, Value};

use crate::error::DuckGateError;
use crate::metadata::ColumnMetadata;
use crate::types::CellValue;

impl From<CellValue> for Value {
    fn from(cell: CellValue) -> Value {
        match cell {
            CellValue::Null => Value::Null,
            CellValue::Integer(v) => Value::BigInt(v),
            CellValue::Float(v) => Value::Double(v),
            CellValue::Boolean(v) => Value::Boolean(v),
            CellValue::Text(v) => Value::Text(v),
            CellValue::Bytes(v) => Value::Blob(v),
        }
    }
}

/// Coerce the value at ordinal position `index` against the resolved column
/// metadata.
pub fn coerce_value(
    value: CellValue,
    index: usize,
    columns: &[ColumnMetadata],
) -> Result<Value, DuckGateError> {
    let Some(column) = columns.get(index) else {
        return Err(DuckGateError::SchemaMismatchError(format!(
            "value index {} exceeds number of columns {}",
            index,
            columns.len()
        )));
    };

    // JSON null always maps to engine null, whatever the declared type.
    if matches!(value, CellValue::Null) {
        return Ok(Value::Null);
    }

    match column.declared_type.as_str() {
        "DATE" => match value {
            CellValue::Text(s) => parse_date(&s)
                .map(date_to_engine)
                .ok_or_else(|| temporal_error("date", &s, column)),
            other => Ok(other.into()),
        },
        "TIMESTAMP" | "TIMESTAMP WITH TIME ZONE" => match value {
            CellValue::Text(s) => parse_timestamp(&s)
                .map(timestamp_to_engine)
                .ok_or_else(|| temporal_error("timestamp", &s, column)),
            other => Ok(other.into()),
        },
        "TIME" => match value {
            CellValue::Text(s) => parse_time(&s)
                .map(time_to_engine)
                .ok_or_else(|| temporal_error("time", &s, column)),
            other => Ok(other.into()),
        },
        // All other declared types pass through; the engine driver handles
        // basic conversions.
        _ => Ok(value.into()),
    }
}

fn temporal_error(kind: &str, literal: &str, column: &ColumnMetadata) -> DuckGateError {
    DuckGateError::SchemaMismatchError(format!(
        "failed to parse {} {:?} for column {:?} (declared type {})",
        kind, literal, column.name, column.declared_type
    ))
}

/// Accepted formats for DATE columns, most specific first: a timestamp string
/// populates a date column by its date portion.
fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.time());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.time());
    }
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok()
}

fn date_to_engine(date: NaiveDate) -> Value {
    // NaiveDate::default() is the Unix epoch
    let days = date.signed_duration_since(NaiveDate::default()).num_days();
    Value::Date32(days as i32)
}

fn timestamp_to_engine(dt: NaiveDateTime) -> Value {
    Value::Timestamp(TimeUnit::Microsecond, dt.and_utc().timestamp_micros())
}

fn time_to_engine(time: NaiveTime) -> Value {
    let micros = i64::from(time.num_seconds_from_midnight()) * 1_000_000
        + i64::from(time.nanosecond() / 1_000);
    Value::Time64(TimeUnit::Microsecond, micros)
}

/// Convert a JSON statement argument into an engine value for binding.
///
/// List and object arguments are a hard error: the engine bindings cannot
/// bind them, and a hard error beats a panic deep inside the driver.
pub fn engine_value_from_json(arg: &serde_json::Value) -> Result<Value, DuckGateError> {
    match arg {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(v) => Ok(Value::Boolean(*v)),
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(Value::BigInt(v))
            } else if n.as_u64().is_some() {
                // Folding into f64 would silently corrupt the integer
                Err(DuckGateError::SerializationError(format!(
                    "integer argument {n} does not fit in a signed 64-bit value"
                )))
            } else if let Some(v) = n.as_f64() {
                Ok(Value::Double(v))
            } else {
                Err(DuckGateError::SerializationError(format!(
                    "unrepresentable numeric argument: {n}"
                )))
            }
        }
        serde_json::Value::String(v) => Ok(Value::Text(v.clone())),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            Err(DuckGateError::SerializationError(
                "list and object arguments are not supported; encode them as strings".to_string(),
            ))
        }
    }
}
