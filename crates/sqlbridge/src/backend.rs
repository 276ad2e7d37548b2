//! One [`DbInstance`](crate::DbInstance) implementation per engine.

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "duckdb")]
pub mod duckdb;

/// Run a synchronous engine call on the blocking pool with the shared connection locked.
#[cfg(any(feature = "sqlite", feature = "duckdb"))]
pub(crate) async fn run_blocking<C, T, F>(
    conn: &std::sync::Arc<parking_lot::Mutex<C>>,
    f: F,
) -> crate::error::DbResult<T>
where
    C: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut C) -> crate::error::DbResult<T> + Send + 'static,
{
    let conn = std::sync::Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.lock();
        f(&mut guard)
    })
    .await?
}

/// Bytes as a JSON array of numbers (what `Vec<u8>` deserializes from).
#[cfg(any(feature = "sqlite", feature = "duckdb", feature = "postgres"))]
pub(crate) fn blob_to_json(bytes: &[u8]) -> serde_json::Value {
    serde_json::Value::Array(bytes.iter().map(|b| serde_json::Value::from(*b)).collect())
}

/// A float as JSON; non-finite values become `null`.
#[cfg(any(feature = "sqlite", feature = "duckdb", feature = "postgres"))]
pub(crate) fn float_to_json(f: f64) -> serde_json::Value {
    serde_json::Number::from_f64(f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
