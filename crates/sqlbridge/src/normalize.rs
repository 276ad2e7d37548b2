//! Flatten a caller payload into SQL-safe scalars.

use crate::error::{DbError, DbResult};
use crate::value::{SqlValue, Value, iso_timestamp};

/// An ordered column → scalar mapping with at least one column.
///
/// Only [`normalize`] constructs it, so every instance has already passed the
/// shape and non-empty checks.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl NormalizedRecord {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no column was kept.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<SqlValue>) {
        (self.columns, self.values)
    }
}

/// Normalize `record` into a [`NormalizedRecord`].
///
/// `label` names the payload in error messages (`data` or `where`).
///
/// - arrays fail with "`<label>` cannot be an array"
/// - any other non-object fails with "`<label>` must be an object"
/// - `Absent` keys are dropped
/// - timestamps become UTC ISO-8601 text, nested arrays/objects become JSON text
/// - zero remaining keys fail with "`<label>` must have at least one property"
pub fn normalize(label: &str, record: &Value) -> DbResult<NormalizedRecord> {
    let record = match record {
        Value::Object(record) => record,
        Value::Array(_) => return Err(DbError::invalid_shape(label, "cannot be an array")),
        _ => return Err(DbError::invalid_shape(label, "must be an object")),
    };

    let mut columns = Vec::with_capacity(record.len());
    let mut values = Vec::with_capacity(record.len());

    for (key, value) in record.iter() {
        let scalar = match value {
            Value::Absent => continue,
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Int(i) => SqlValue::Int(*i),
            Value::Float(f) => SqlValue::Float(*f),
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Timestamp(ts) => SqlValue::Text(iso_timestamp(ts)),
            Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_json().to_string()),
        };
        columns.push(key.to_string());
        values.push(scalar);
    }

    if columns.is_empty() {
        return Err(DbError::empty_payload(label));
    }

    Ok(NormalizedRecord { columns, values })
}
