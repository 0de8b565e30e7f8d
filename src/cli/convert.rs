//! Plain JSON <-> formql Value and Record conversion

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use super::CliError;
use crate::record::Record;
use crate::schema::SystemColumn;
use crate::value::{Value, parse_date};

/// Convert serde_json::Value to a formql Value.
///
/// Strings stay text; the evaluator coerces them to numbers or dates where
/// an operator asks for one.
pub fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64))
            .map_or(Value::Null, Value::Number),
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Array(arr) => Value::List(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            Value::Structured(obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect())
        }
    }
}

/// Convert a formql Value to serde_json::Value
pub fn value_to_json(v: Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(b),
        Value::Number(n) => serde_json::Number::from_str(&n.normalize().to_string())
            .map(serde_json::Value::Number)
            .unwrap_or_else(|_| serde_json::Value::String(n.to_string())),
        Value::Text(s) => serde_json::Value::String(s),
        Value::Date(d) => serde_json::Value::String(d.to_rfc3339()),
        Value::List(items) => serde_json::Value::Array(items.into_iter().map(value_to_json).collect()),
        Value::Structured(fields) => serde_json::Value::Object(
            fields.into_iter().map(|(k, v)| (k, value_to_json(v))).collect(),
        ),
    }
}

/// Convert a flat JSON object into a record.
///
/// `submission_id`, `submitted_by` and `submitted_at` fill the metadata
/// slots; every other key becomes a field value.
pub fn json_to_record(v: serde_json::Value) -> Result<Record, CliError> {
    let serde_json::Value::Object(obj) = v else {
        return Err(CliError::InvalidRecord("expected a JSON object".to_string()));
    };

    let mut record = Record::default();
    for (key, value) in obj {
        match SystemColumn::lookup(&key) {
            Some(SystemColumn::SubmissionId) => record.submission_id = metadata_text(&key, value)?,
            Some(SystemColumn::SubmittedBy) => record.submitted_by = metadata_text(&key, value)?,
            Some(SystemColumn::SubmittedAt) => {
                record.submitted_at = match metadata_text(&key, value)? {
                    Some(text) => Some(parse_date(&text).ok_or_else(|| {
                        CliError::InvalidRecord(format!("submitted_at is not a date: {}", text))
                    })?),
                    None => None,
                };
            }
            None => {
                record.values.insert(key, json_to_value(value));
            }
        }
    }
    Ok(record)
}

fn metadata_text(key: &str, value: serde_json::Value) -> Result<Option<String>, CliError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        other => Err(CliError::InvalidRecord(format!("{} must be a string, got {}", key, other))),
    }
}

/// Convert a record back into the flat JSON shape read by [`json_to_record`].
pub fn record_to_json(record: Record) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    if let Some(id) = record.submission_id {
        obj.insert(SystemColumn::SubmissionId.name().to_string(), id.into());
    }
    if let Some(by) = record.submitted_by {
        obj.insert(SystemColumn::SubmittedBy.name().to_string(), by.into());
    }
    if let Some(at) = record.submitted_at {
        obj.insert(SystemColumn::SubmittedAt.name().to_string(), at.to_rfc3339().into());
    }
    for (key, value) in record.values {
        obj.insert(key, value_to_json(value));
    }
    serde_json::Value::Object(obj)
}
