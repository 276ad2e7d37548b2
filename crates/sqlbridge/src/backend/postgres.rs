//! PostgreSQL adapter over any [`GenericClient`].

pub mod types;

use crate::client::GenericClient;
use crate::error::{DbError, DbResult};
use crate::instance::{DbInstance, InsertOutcome, InstanceOptions, WriteReceipt};
use crate::log::log_statement;
use crate::row::Row;
use crate::sql::PlaceholderStyle;
use crate::value::{SqlValue, Value};
use types::{from_pg_row, params_as_refs, to_pg_params};

const BACKEND: &str = "postgres";

/// A [`DbInstance`] backed by a tokio-postgres connection.
///
/// `single` fails with [`DbError::MultipleRows`] when the query yields more
/// than one row.
///
/// ```ignore
/// let (client, connection) = tokio_postgres::connect(&url, NoTls).await?;
/// tokio::spawn(connection);
/// let db = PgInstance::new(client);
/// let row = db.insert("users", record! { "name" => "Jhon" }, &["id"]).await?;
/// ```
pub struct PgInstance<C> {
    client: C,
    options: InstanceOptions,
}

impl<C: GenericClient> PgInstance<C> {
    pub fn new(client: C) -> Self {
        Self::with_options(client, InstanceOptions::default())
    }

    pub fn with_options(client: C, options: InstanceOptions) -> Self {
        Self { client, options }
    }

    /// The wrapped client.
    pub fn handle(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> &InstanceOptions {
        &self.options
    }

    pub fn into_inner(self) -> C {
        self.client
    }

    async fn query_rows(&self, op: &'static str, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        log_statement(BACKEND, op, sql, params.len(), self.options.max_sql_length);
        let wrapped = to_pg_params(params);
        let refs = params_as_refs(&wrapped);
        let rows = self.client.query(sql, &refs).await?;
        rows.iter().map(from_pg_row).collect()
    }

    async fn execute_stmt(&self, op: &'static str, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        log_statement(BACKEND, op, sql, params.len(), self.options.max_sql_length);
        let wrapped = to_pg_params(params);
        let refs = params_as_refs(&wrapped);
        self.client.execute(sql, &refs).await
    }
}

impl<C: GenericClient> DbInstance for PgInstance<C> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::validate::{Schema, TableSchemas};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_postgres::types::ToSql;

    /// Records every statement; queries return no rows, executes report `affected`.
    #[derive(Default)]
    struct StubClient {
        queries: AtomicUsize,
        executes: AtomicUsize,
        affected: u64,
        statements: Mutex<Vec<(String, usize)>>,
    }

    impl StubClient {
        fn affecting(affected: u64) -> Self {
            Self {
                affected,
                ..Self::default()
            }
        }

        fn statements(&self) -> Vec<(String, usize)> {
            self.statements.lock().unwrap().clone()
        }
    }

    impl GenericClient for StubClient {
        async fn query(
            &self,
            sql: &str,
            params: &[&(dyn ToSql + Sync)],
        ) -> DbResult<Vec<tokio_postgres::Row>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.statements.lock().unwrap().push((sql.to_string(), params.len()));
            Ok(Vec::new())
        }

        async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
            self.executes.fetch_add(1, Ordering::SeqCst);
            self.statements.lock().unwrap().push((sql.to_string(), params.len()));
            Ok(self.affected)
        }
    }

    #[tokio::test]
    async fn insert_without_returning_executes() {
        let db = PgInstance::new(StubClient::affecting(1));
        let outcome = db
            .insert("table1", record! { "data" => "test", "n" => 2 }, &[])
            .await
            .unwrap();

        assert_eq!(
            outcome.receipt(),
            Some(&WriteReceipt { rows_affected: 1, last_insert_id: None })
        );
        assert_eq!(
            db.handle().statements(),
            vec![("INSERT INTO table1 (data, n) VALUES ($1, $2)".to_string(), 2)]
        );
        assert_eq!(db.handle().queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn insert_with_returning_queries() {
        let db = PgInstance::new(StubClient::default());
        let err = db
            .insert("table1", record! { "data" => "test" }, &["id", "data"])
            .await
            .unwrap_err();

        // the stub returns no rows
        assert!(matches!(err, DbError::NotFound(_)));
        assert_eq!(
            db.handle().statements()[0].0,
            "INSERT INTO table1 (data) VALUES ($1) RETURNING id, data"
        );
        assert_eq!(db.handle().queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn update_reports_affected_rows() {
        let db = PgInstance::new(StubClient::affecting(3));
        let affected = db
            .update("table1", record! { "data" => "new" }, record! { "id" => 1, "kind" => "a" })
            .await
            .unwrap();

        assert_eq!(affected, Some(3));
        assert_eq!(
            db.handle().statements(),
            vec![(
                "UPDATE table1 SET data = $1 WHERE id = $2 AND kind = $3;".to_string(),
                3
            )]
        );
    }

    #[tokio::test]
    async fn rejected_payloads_never_reach_the_client() {
        let options = InstanceOptions::new()
            .insert_validator(TableSchemas::new().table("table1", Schema::new().required("data")));
        let db = PgInstance::with_options(StubClient::default(), options);

        let err = db.insert("table1", record! { "other" => 1 }, &[]).await.unwrap_err();
        assert!(err.is_validation());

        let err = db.insert("table1", record! {}, &[]).await.unwrap_err();
        assert!(err.is_validation());

        let err = db
            .update("table1", record! {}, record! { "id" => 1 })
            .await
            .unwrap_err();
        assert!(err.is_empty_payload());

        assert!(db.handle().statements().is_empty());
    }

    #[tokio::test]
    async fn rejected_updates_never_reach_the_client() {
        let schemas = TableSchemas::new()
            .table("table1", Schema::new().min_len("data", 3).range("id", Some(1.0), None))
            .partial();
        let options = InstanceOptions::new().update_validator(schemas);
        let db = PgInstance::with_options(StubClient::affecting(1), options);

        let err = db
            .update("table1", record! { "data" => "ab" }, record! { "id" => 1 })
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = db
            .update("table1", record! { "data" => "abc" }, record! { "id" => 0 })
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert!(db.handle().statements().is_empty());
        assert_eq!(db.handle().executes.load(Ordering::SeqCst), 0);

        let affected = db
            .update("table1", record! { "data" => "abc" }, record! { "id" => 1 })
            .await
            .unwrap();
        assert_eq!(affected, Some(1));
        assert_eq!(db.handle().statements().len(), 1);
    }

    #[tokio::test]
    async fn single_and_rows_on_empty_result() {
        let db = PgInstance::new(StubClient::default());
        assert!(db.rows("SELECT 1 WHERE false", &[]).await.unwrap().is_empty());
        assert!(db.single("SELECT 1 WHERE false", &[]).await.unwrap().is_none());
        assert_eq!(
            db.execute("DELETE FROM table1 WHERE id = $1", &[SqlValue::Int(1)])
                .await
                .unwrap(),
            Some(0)
        );
        assert_eq!(db.backend(), "postgres");
    }

    #[tokio::test]
    async fn borrowed_client_works() {
        let client = StubClient::affecting(1);
        let db = PgInstance::new(&client);
        db.execute("SELECT 1", &[]).await.unwrap();
        assert_eq!(client.executes.load(Ordering::SeqCst), 1);
    }
}
