//! DuckDB adapter.

use crate::backend::{blob_to_json, float_to_json, run_blocking};
use crate::error::{DbError, DbResult};
use crate::instance::{DbInstance, InsertOutcome, InstanceOptions, WriteReceipt};
use crate::log::log_statement;
use crate::row::Row;
use crate::sql::PlaceholderStyle;
use crate::value::{SqlValue, Value, iso_timestamp};
use chrono::{DateTime, Days, NaiveDate};
use duckdb::Connection;
use duckdb::types::{TimeUnit, Value as DuckValue};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;

const BACKEND: &str = "duckdb";

/// A [`DbInstance`] backed by a single DuckDB connection.
///
/// Uses `$n` placeholders. `single` fails with [`DbError::MultipleRows`] when
/// the query yields more than one row.
#[derive(Clone)]
pub struct DuckDbInstance {
    conn: Arc<Mutex<Connection>>,
    options: InstanceOptions,
}

impl DuckDbInstance {
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn new(conn: Connection) -> Self {
        Self::with_options(conn, InstanceOptions::default())
    }

    pub fn with_options(conn: Connection, options: InstanceOptions) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            options,
        }
    }

    pub fn options(&self) -> &InstanceOptions {
        &self.options
    }

    /// The shared connection; lock it to use the engine directly.
    pub fn handle(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    /// Run a closure against the raw connection on the blocking pool.
    pub async fn with_connection<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> DbResult<T> + Send + 'static,
    {
        run_blocking(&self.conn, f).await
    }

    async fn query_rows(&self, op: &'static str, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        log_statement(BACKEND, op, sql, params.len(), self.options.max_sql_length);
        let sql = sql.to_string();
        let params = to_duck_params(params);
        run_blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(duckdb::params_from_iter(params))?;
            // column names are only known once the statement has run
            let columns: Vec<String> = rows
                .as_ref()
                .map(|stmt| stmt.column_names())
                .unwrap_or_default();

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let values = (0..columns.len())
                    .map(|i| row.get::<_, DuckValue>(i).map(from_duck_value))
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(Row::new(columns.clone(), values));
            }
            Ok(out)
        })
        .await
    }

    async fn execute_stmt(&self, op: &'static str, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        log_statement(BACKEND, op, sql, params.len(), self.options.max_sql_length);
        let sql = sql.to_string();
        let params = to_duck_params(params);
        run_blocking(&self.conn, move |conn| {
            let changes = conn.execute(&sql, duckdb::params_from_iter(params))?;
            Ok(changes as u64)
        })
        .await
    }
}

impl DbInstance for DuckDbInstance {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }

    async fn rows(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        self.query_rows("rows", sql, params).await
    }

    async fn single(&self, sql: &str, params: &[SqlValue]) -> DbResult<Option<Row>> {
        let mut rows = self.query_rows("single", sql, params).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(DbError::MultipleRows(n)),
        }
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<Option<u64>> {
        self.execute_stmt("execute", sql, params).await.map(Some)
    }

    async fn insert(&self, table: &str, values: Value, returning: &[&str]) -> DbResult<InsertOutcome> {
        let generated = self
            .options
            .prepare_insert(BACKEND, table, values, returning, PlaceholderStyle::Numbered)?;

        if returning.is_empty() {
            let rows_affected = self
                .execute_stmt("insert", generated.sql(), generated.params())
                .await?;
            return Ok(InsertOutcome::Acknowledged(WriteReceipt {
                rows_affected,
                last_insert_id: None,
            }));
        }

        let rows = self
            .query_rows("insert", generated.sql(), generated.params())
            .await?;
        rows.into_iter()
            .next()
            .map(InsertOutcome::Returned)
            .ok_or_else(|| DbError::not_found(format!("insert into {table} returned no row")))
    }

    async fn update(&self, table: &str, data: Value, filter: Value) -> DbResult<Option<u64>> {
        let generated = self
            .options
            .prepare_update(BACKEND, table, data, filter, PlaceholderStyle::Numbered)?;
        self.execute_stmt("update", generated.sql(), generated.params())
            .await
            .map(Some)
    }
}

fn to_duck_params(params: &[SqlValue]) -> Vec<DuckValue> {
    params
        .iter()
        .map(|p| match p {
            SqlValue::Null => DuckValue::Null,
            SqlValue::Bool(b) => DuckValue::Boolean(*b),
            SqlValue::Int(i) => DuckValue::BigInt(*i),
            SqlValue::Float(f) => DuckValue::Double(*f),
            SqlValue::Text(s) => DuckValue::Text(s.clone()),
        })
        .collect()
}

fn from_duck_value(value: DuckValue) -> JsonValue {
    match value {
        DuckValue::Null => JsonValue::Null,
        DuckValue::Boolean(b) => JsonValue::Bool(b),
        DuckValue::TinyInt(i) => JsonValue::from(i),
        DuckValue::SmallInt(i) => JsonValue::from(i),
        DuckValue::Int(i) => JsonValue::from(i),
        DuckValue::BigInt(i) => JsonValue::from(i),
        DuckValue::HugeInt(i) => match i64::try_from(i) {
            Ok(i) => JsonValue::from(i),
            Err(_) => JsonValue::String(i.to_string()),
        },
        DuckValue::UTinyInt(i) => JsonValue::from(i),
        DuckValue::USmallInt(i) => JsonValue::from(i),
        DuckValue::UInt(i) => JsonValue::from(i),
        DuckValue::UBigInt(i) => JsonValue::from(i),
        DuckValue::Float(f) => float_to_json(f as f64),
        DuckValue::Double(f) => float_to_json(f),
        DuckValue::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>().map(float_to_json).unwrap_or(JsonValue::String(text))
        }
        DuckValue::Text(s) | DuckValue::Enum(s) => JsonValue::String(s),
        DuckValue::Blob(b) => blob_to_json(&b),
        DuckValue::Timestamp(unit, raw) => timestamp_to_json(unit, raw),
        DuckValue::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| {
                if days >= 0 {
                    epoch.checked_add_days(Days::new(days as u64))
                } else {
                    epoch.checked_sub_days(Days::new(days.unsigned_abs() as u64))
                }
            })
            .map(|d| JsonValue::String(d.to_string()))
            .unwrap_or(JsonValue::Null),
        DuckValue::List(items) => JsonValue::Array(items.into_iter().map(from_duck_value).collect()),
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn timestamp_to_json(unit: TimeUnit, raw: i64) -> JsonValue {
    let micros = match unit {
        TimeUnit::Second => raw.checked_mul(1_000_000),
        TimeUnit::Millisecond => raw.checked_mul(1_000),
        TimeUnit::Microsecond => Some(raw),
        TimeUnit::Nanosecond => Some(raw / 1_000),
    };
    micros
        .and_then(DateTime::from_timestamp_micros)
        .map(|ts| JsonValue::String(iso_timestamp(&ts)))
        .unwrap_or(JsonValue::Null)
}
