//! SQLite adapter over rusqlite.
//!
//! rusqlite is synchronous; every call locks the shared connection and runs on
//! tokio's blocking pool.

use crate::backend::{blob_to_json, float_to_json, run_blocking};
use crate::error::{DbError, DbResult};
use crate::instance::{DbInstance, InsertOutcome, InstanceOptions, WriteReceipt};
use crate::log::log_statement;
use crate::row::Row;
use crate::sql::PlaceholderStyle;
use crate::value::{SqlValue, Value};
use parking_lot::Mutex;
use rusqlite::Connection;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;

const BACKEND: &str = "sqlite";

/// A [`DbInstance`] backed by a single SQLite connection.
///
/// `single` never fails on extra rows: it reads the first row and ignores the
/// rest. Inserts without `RETURNING` report the rowid of the inserted row.
#[derive(Clone)]
pub struct SqliteInstance {
    conn: Arc<Mutex<Connection>>,
    options: InstanceOptions,
}

impl SqliteInstance {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    /// Open a private in-memory database.
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

    async fn query_rows(
        &self,
        op: &'static str,
        sql: &str,
        params: &[SqlValue],
        limit: Option<usize>,
    ) -> DbResult<Vec<Row>> {
        log_statement(BACKEND, op, sql, params.len(), self.options.max_sql_length);
        let sql = sql.to_string();
        let params = to_sqlite_params(params);
        run_blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let values = (0..columns.len())
                    .map(|i| row.get_ref(i).map(from_sqlite_value))
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(Row::new(columns.clone(), values));
                if limit.is_some_and(|limit| out.len() >= limit) {
                    break;
                }
            }
            Ok(out)
        })
        .await
    }

    /// Execute a statement; returns the change count and the last inserted rowid.
    async fn execute_stmt(
        &self,
        op: &'static str,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<(u64, i64)> {
        log_statement(BACKEND, op, sql, params.len(), self.options.max_sql_length);
        let sql = sql.to_string();
        let params = to_sqlite_params(params);
        run_blocking(&self.conn, move |conn| {
            let changes = conn.execute(&sql, rusqlite::params_from_iter(params))?;
            Ok((changes as u64, conn.last_insert_rowid()))
        })
        .await
    }
}

impl DbInstance for SqliteInstance {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Positional
    }

    async fn rows(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        self.query_rows("rows", sql, params, None).await
    }

    async fn single(&self, sql: &str, params: &[SqlValue]) -> DbResult<Option<Row>> {
        let rows = self.query_rows("single", sql, params, Some(1)).await?;
        Ok(rows.into_iter().next())
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<Option<u64>> {
        let (changes, _) = self.execute_stmt("execute", sql, params).await?;
        Ok(Some(changes))
    }

    async fn insert(&self, table: &str, values: Value, returning: &[&str]) -> DbResult<InsertOutcome> {
        let generated = self
            .options
            .prepare_insert(BACKEND, table, values, returning, PlaceholderStyle::Positional)?;

        if returning.is_empty() {
            let (rows_affected, rowid) = self
                .execute_stmt("insert", generated.sql(), generated.params())
                .await?;
            return Ok(InsertOutcome::Acknowledged(WriteReceipt {
                rows_affected,
                last_insert_id: Some(rowid),
            }));
        }

        let rows = self
            .query_rows("insert", generated.sql(), generated.params(), None)
            .await?;
        rows.into_iter()
            .next()
            .map(InsertOutcome::Returned)
            .ok_or_else(|| DbError::not_found(format!("insert into {table} returned no row")))
    }

    async fn update(&self, table: &str, data: Value, filter: Value) -> DbResult<Option<u64>> {
        let generated = self
            .options
            .prepare_update(BACKEND, table, data, filter, PlaceholderStyle::Positional)?;
        let (changes, _) = self
            .execute_stmt("update", generated.sql(), generated.params())
            .await?;
        Ok(Some(changes))
    }
}

fn to_sqlite_params(params: &[SqlValue]) -> Vec<SqliteValue> {
    params
        .iter()
        .map(|p| match p {
            SqlValue::Null => SqliteValue::Null,
            // SQLite has no boolean storage class
            SqlValue::Bool(b) => SqliteValue::Integer(i64::from(*b)),
            SqlValue::Int(i) => SqliteValue::Integer(*i),
            SqlValue::Float(f) => SqliteValue::Real(*f),
            SqlValue::Text(s) => SqliteValue::Text(s.clone()),
        })
        .collect()
}

fn from_sqlite_value(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => float_to_json(f),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => blob_to_json(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::validate::{Schema, TableSchemas, ValidationErrors};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    async fn setup() -> SqliteInstance {
        setup_with(InstanceOptions::new()).await
    }

    async fn setup_with(options: InstanceOptions) -> SqliteInstance {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE table1 (id INTEGER PRIMARY KEY AUTOINCREMENT, data TEXT, extra TEXT);",
        )
        .unwrap();
        SqliteInstance::with_options(conn, options)
    }

    #[tokio::test]
    async fn insert_reports_rowid() {
        let db = setup().await;
        let first = db.insert("table1", record! { "data" => "test" }, &[]).await.unwrap();
        let second = db.insert("table1", record! { "data" => "test" }, &[]).await.unwrap();

        assert_eq!(
            first.receipt(),
            Some(&WriteReceipt { rows_affected: 1, last_insert_id: Some(1) })
        );
        assert_eq!(second.receipt().unwrap().last_insert_id, Some(2));
    }

    #[tokio::test]
    async fn insert_returning_yields_row() {
        let db = setup().await;
        let outcome = db
            .insert("table1", record! { "data" => "test" }, &["id", "data"])
            .await
            .unwrap();
        let row = outcome.into_row().unwrap();
        assert_eq!(row.to_json(), json!({ "id": 1, "data": "test" }));
    }

    #[tokio::test]
    async fn structured_and_temporal_values_are_stored_as_text() {
        let db = setup().await;
        let at = Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap();
        db.insert(
            "table1",
            record! { "data" => record! { "name" => "Jhon" }, "extra" => at },
            &[],
        )
        .await
        .unwrap();

        let row = db
            .single("SELECT data, extra FROM table1", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("data"), Some(&json!(r#"{"name":"Jhon"}"#)));
        assert_eq!(row.get("extra"), Some(&json!("2024-08-10T00:00:00.000Z")));
    }

    #[tokio::test]
    async fn update_counts_rows() {
        let db = setup().await;
        for _ in 0..3 {
            db.insert("table1", record! { "data" => "old" }, &[]).await.unwrap();
        }

        let affected = db
            .update("table1", record! { "data" => "new" }, record! { "data" => "old" })
            .await
            .unwrap();
        assert_eq!(affected, Some(3));

        let affected = db
            .update("table1", record! { "data" => "x" }, record! { "id" => 99 })
            .await
            .unwrap();
        assert_eq!(affected, Some(0));
    }

    #[tokio::test]
    async fn single_takes_first_of_many() {
        let db = setup().await;
        db.insert("table1", record! { "data" => "a" }, &[]).await.unwrap();
        db.insert("table1", record! { "data" => "b" }, &[]).await.unwrap();

        let row = db
            .single("SELECT data FROM table1 ORDER BY id", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.try_get::<String>("data").unwrap(), "a");

        let none = db
            .single("SELECT data FROM table1 WHERE id = ?", &[SqlValue::Int(42)])
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn rows_and_execute() {
        let db = setup().await;
        db.insert("table1", record! { "data" => "a" }, &[]).await.unwrap();
        db.insert("table1", record! { "data" => "b", "extra" => Value::Null }, &[])
            .await
            .unwrap();

        let rows = db
            .rows("SELECT id, extra FROM table1 ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("extra"), Some(&JsonValue::Null));

        let deleted = db
            .execute("DELETE FROM table1 WHERE data = ?", &[SqlValue::from("a")])
            .await
            .unwrap();
        assert_eq!(deleted, Some(1));
    }

    #[tokio::test]
    async fn validators_gate_writes() {
        let insert = TableSchemas::new().table("table1", Schema::new().min_len("data", 4));
        let options = InstanceOptions::new()
            .insert_validator(insert)
            .update_validator(|_: &str, payload: Value| -> Result<Value, ValidationErrors> {
                Ok(payload)
            });
        let db = setup_with(options).await;

        let err = db.insert("table1", record! { "data" => "abc" }, &[]).await.unwrap_err();
        assert!(err.is_validation());
        assert!(db.rows("SELECT id FROM table1", &[]).await.unwrap().is_empty());

        db.insert("table1", record! { "data" => "abcd" }, &[]).await.unwrap();
        let affected = db
            .update("table1", record! { "data" => "efgh" }, record! { "id" => 1 })
            .await
            .unwrap();
        assert_eq!(affected, Some(1));
    }

    #[tokio::test]
    async fn engine_errors_surface() {
        let db = setup().await;
        let err = db.insert("missing", record! { "data" => "x" }, &[]).await.unwrap_err();
        assert!(err.is_engine_error());
    }

    #[tokio::test]
    async fn with_connection_runs_raw_calls() {
        let db = setup().await;
        let count = db
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT count(*) FROM table1", [], |r| r.get::<_, i64>(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
