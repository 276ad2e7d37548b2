//! INSERT/UPDATE synthesis over normalized records.
//!
//! Nothing here touches a connection: the output is SQL text plus the ordered
//! parameter list, usable for logging or tests as well as execution.
//!
//! ```ignore
//! use sqlbridge::{PlaceholderStyle, build_update, record};
//!
//! let generated = build_update(
//!     "users",
//!     &record! { "name" => "alice" },
//!     &record! { "id" => 1 },
//!     PlaceholderStyle::Numbered,
//! )?;
//! assert_eq!(generated.sql(), "UPDATE users SET name = $1 WHERE id = $2;");
//! ```

use crate::error::DbResult;
use crate::normalize::normalize;
use crate::value::{SqlValue, Value};

/// How parameter slots are spelled in generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...` (PostgreSQL, DuckDB)
    #[default]
    Numbered,
    /// `?` for every slot, bound purely by order (SQLite)
    Positional,
}

impl PlaceholderStyle {
    /// Render the placeholder for the 1-based slot `index`.
    pub fn render(self, index: usize) -> String {
        match self {
            PlaceholderStyle::Numbered => format!("${index}"),
            PlaceholderStyle::Positional => "?".to_string(),
        }
    }
}

/// SQL text and the parameters bound to its placeholders, in slot order.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSql {
    sql: String,
    params: Vec<SqlValue>,
}

impl GeneratedSql {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}

/// Build `INSERT INTO <table> (<cols>) VALUES (<placeholders>) [RETURNING <cols>]`.
///
/// `record` is normalized with the label `data`. An empty `returning` emits no
/// `RETURNING` clause.
pub fn build_insert(
    table: &str,
    record: &Value,
    returning: &[&str],
    style: PlaceholderStyle,
) -> DbResult<GeneratedSql> {
    let (columns, params) = normalize("data", record)?.into_parts();

    let placeholders: Vec<String> = (1..=params.len()).map(|i| style.render(i)).collect();

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );

    if !returning.is_empty() {
        sql.push_str(" RETURNING ");
        sql.push_str(&returning.join(", "));
    }

    Ok(GeneratedSql { sql, params })
}

/// Build `UPDATE <table> SET <assignments> WHERE <conditions>;`.
///
/// `data` and `filter` are normalized independently (labels `data` and
/// `where`). SET takes slots `1..=N`, WHERE continues at `N + 1`; the returned
/// params are the data values followed by the filter values.
pub fn build_update(
    table: &str,
    data: &Value,
    filter: &Value,
    style: PlaceholderStyle,
) -> DbResult<GeneratedSql> {
    let (set_columns, set_values) = normalize("data", data)?.into_parts();
    let (where_columns, where_values) = normalize("where", filter)?.into_parts();

    let offset = set_values.len();

    let assignments: Vec<String> = set_columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = {}", col, style.render(i + 1)))
        .collect();

    let conditions: Vec<String> = where_columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = {}", col, style.render(offset + i + 1)))
        .collect();

    let sql = format!(
        "UPDATE {} SET {} WHERE {};",
        table,
        assignments.join(", "),
        conditions.join(" AND ")
    );

    let mut params = set_values;
    params.extend(where_values);

    Ok(GeneratedSql { sql, params })
}
