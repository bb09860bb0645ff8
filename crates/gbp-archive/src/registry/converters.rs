//! Stock converters.

use super::{ConversionError, FieldValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// ISO-8601 timestamp string (or null) to [`FieldValue::Timestamp`].
///
/// Accepts RFC 3339 with any offset, and naive `YYYY-MM-DDTHH:MM:SS[.f]`
/// which is taken as UTC.
pub fn iso_timestamp(value: Value) -> Result<FieldValue, ConversionError> {
    match value {
        Value::Null => Ok(FieldValue::Raw(Value::Null)),
        Value::String(s) => parse_timestamp(&s).map(FieldValue::Timestamp),
        other => Err(ConversionError::new(format!(
            "expected ISO-8601 string, found {}",
            other
        ))),
    }
}

/// ISO-8601 calendar date string to [`FieldValue::Date`].
pub fn iso_date(value: Value) -> Result<FieldValue, ConversionError> {
    match value {
        Value::String(s) => Ok(FieldValue::Date(NaiveDate::parse_from_str(&s, "%Y-%m-%d")?)),
        other => Err(ConversionError::new(format!(
            "expected ISO-8601 date string, found {}",
            other
        ))),
    }
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ConversionError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| ConversionError::new(format!("invalid timestamp '{}': {}", s, e)))?;
    Ok(naive.and_utc())
}
