//! The contract every backend adapter satisfies.

use crate::error::{DbError, DbResult};
use crate::log::log_rejected;
use crate::row::Row;
use crate::sql::{GeneratedSql, PlaceholderStyle, build_insert, build_update};
use crate::validate::{PayloadValidator, SharedValidator};
use crate::value::{SqlValue, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Acknowledgment of a write that returned no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteReceipt {
    /// Rows written by the statement.
    pub rows_affected: u64,
    /// Rowid of the last inserted row (SQLite only).
    pub last_insert_id: Option<i64>,
}

/// What `insert` hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The first row of the `RETURNING` clause.
    Returned(Row),
    /// No `RETURNING` columns were requested.
    Acknowledged(WriteReceipt),
}

impl InsertOutcome {
    pub fn row(&self) -> Option<&Row> {
        match self {
            InsertOutcome::Returned(row) => Some(row),
            InsertOutcome::Acknowledged(_) => None,
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            InsertOutcome::Returned(row) => Some(row),
            InsertOutcome::Acknowledged(_) => None,
        }
    }

    pub fn receipt(&self) -> Option<&WriteReceipt> {
        match self {
            InsertOutcome::Returned(_) => None,
            InsertOutcome::Acknowledged(receipt) => Some(receipt),
        }
    }
}

/// Per-instance configuration: validator slots and SQL logging.
#[derive(Clone)]
pub struct InstanceOptions {
    /// Runs on insert payloads.
    pub insert_validator: Option<SharedValidator>,
    /// Runs on update data and on update filters, separately.
    pub update_validator: Option<SharedValidator>,
    /// Truncate logged SQL (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            insert_validator: None,
            update_validator: None,
            max_sql_length: Some(200),
        }
    }
}

impl fmt::Debug for InstanceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceOptions")
            .field("insert_validator", &self.insert_validator.as_ref().map(|_| "<validator>"))
            .field("update_validator", &self.update_validator.as_ref().map(|_| "<validator>"))
            .field("max_sql_length", &self.max_sql_length)
            .finish()
    }
}

impl InstanceOptions {
    /// Create options with defaults (no validators, SQL logged up to 200 bytes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the validator for insert payloads.
    pub fn insert_validator(mut self, validator: impl PayloadValidator + 'static) -> Self {
        self.insert_validator = Some(Arc::new(validator));
        self
    }

    /// Set the validator for update data and filters.
    pub fn update_validator(mut self, validator: impl PayloadValidator + 'static) -> Self {
        self.update_validator = Some(Arc::new(validator));
        self
    }

    /// Set maximum SQL length to log.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation in logs.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    /// Run the insert validator (if any), then synthesize the INSERT.
    pub(crate) fn prepare_insert(
        &self,
        backend: &'static str,
        table: &str,
        values: Value,
        returning: &[&str],
        style: PlaceholderStyle,
    ) -> DbResult<GeneratedSql> {
        let values = run_validator(backend, "insert", self.insert_validator.as_deref(), table, values)?;
        build_insert(table, &values, returning, style)
    }

    /// Run the update validator (if any) on both payloads, then synthesize the UPDATE.
    pub(crate) fn prepare_update(
        &self,
        backend: &'static str,
        table: &str,
        data: Value,
        filter: Value,
        style: PlaceholderStyle,
    ) -> DbResult<GeneratedSql> {
        let validator = self.update_validator.as_deref();
        let data = run_validator(backend, "update", validator, table, data)?;
        let filter = run_validator(backend, "update", validator, table, filter)?;
        build_update(table, &data, &filter, style)
    }
}

fn run_validator(
    backend: &'static str,
    op: &'static str,
    validator: Option<&dyn PayloadValidator>,
    table: &str,
    payload: Value,
) -> DbResult<Value> {
    let Some(validator) = validator else {
        return Ok(payload);
    };
    validator.validate(table, payload).map_err(|errors| {
        log_rejected(backend, op, table, errors.len());
        DbError::Validation(errors)
    })
}

/// A database instance: raw row queries plus validated INSERT/UPDATE helpers.
///
/// One implementation exists per backend; callers program against this trait
/// and pick the backend when constructing the instance.
///
/// ```ignore
/// async fn rename(db: &impl DbInstance, id: i64, name: &str) -> DbResult<Option<u64>> {
///     db.update("users", record! { "name" => name }, record! { "id" => id }).await
/// }
/// ```
pub trait DbInstance: Send + Sync {
    /// Name of the backend, used in logs.
    fn backend(&self) -> &'static str;

    /// Placeholder style this backend's SQL must use.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Execute a query and return every row, in the engine's order.
    fn rows(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = DbResult<Vec<Row>>> + Send;

    /// Execute a query and return at most one row.
    ///
    /// Whether more than one row is an error ([`DbError::MultipleRows`]) or
    /// silently yields the first row depends on the backend; see each adapter.
    fn single(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = DbResult<Option<Row>>> + Send;

    /// Execute a statement and return the affected-row count, or `None` when
    /// the engine cannot report one.
    fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = DbResult<Option<u64>>> + Send;

    /// Validate, synthesize and run an INSERT.
    ///
    /// With `returning` columns the first returned row comes back as
    /// [`InsertOutcome::Returned`]; without, the engine's acknowledgment does.
    fn insert(
        &self,
        table: &str,
        values: Value,
        returning: &[&str],
    ) -> impl Future<Output = DbResult<InsertOutcome>> + Send;

    /// Validate, synthesize and run an UPDATE, returning the affected-row count.
    fn update(
        &self,
        table: &str,
        data: Value,
        filter: Value,
    ) -> impl Future<Output = DbResult<Option<u64>>> + Send;
}
