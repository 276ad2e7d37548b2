//! `tracing` events for the SQL each adapter is about to run.
//!
//! Events use the target `sqlbridge.sql` at `DEBUG`; parameter values are never
//! recorded, only their count.

/// Truncate a string to at most `max_bytes` bytes on a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

fn display_sql(sql: &str, max_sql_length: Option<usize>) -> String {
    match max_sql_length {
        Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
        _ => sql.to_string(),
    }
}

/// Emit the statement about to be sent to `backend`.
pub(crate) fn log_statement(
    backend: &'static str,
    op: &'static str,
    sql: &str,
    param_count: usize,
    max_sql_length: Option<usize>,
) {
    if !tracing::enabled!(target: "sqlbridge.sql", tracing::Level::DEBUG) {
        return;
    }
    let sql = display_sql(sql, max_sql_length);
    tracing::debug!(
        target: "sqlbridge.sql",
        backend,
        op,
        param_count,
        sql = %sql,
    );
}

/// Emit a payload rejected by a validator.
pub(crate) fn log_rejected(backend: &'static str, op: &'static str, table: &str, errors: usize) {
    tracing::debug!(
        target: "sqlbridge.sql",
        backend,
        op,
        table,
        errors,
        "payload rejected by validator"
    );
}
