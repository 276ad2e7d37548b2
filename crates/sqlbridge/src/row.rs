//! Backend-neutral result rows.

use crate::error::{DbError, DbResult};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// One result row: column names with JSON-typed values, in select order.
///
/// Each adapter converts its native row into this shape, so callers read rows
/// the same way regardless of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<JsonValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<JsonValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[JsonValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_by_index(&self, index: usize) -> Option<&JsonValue> {
        self.values.get(index)
    }

    /// Decode one column into `T`.
    pub fn try_get<T: DeserializeOwned>(&self, column: &str) -> DbResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| DbError::not_found(format!("column '{column}'")))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            DbError::Serialization(format!("column '{column}': {e}"))
        })
    }

    /// Convert to a JSON object.
    pub fn to_json(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        for (col, val) in self.columns.iter().zip(self.values.iter()) {
            map.insert(col.clone(), val.clone());
        }
        JsonValue::Object(map)
    }

    /// Decode the whole row into `T` by column name.
    pub fn deserialize<T: DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}
