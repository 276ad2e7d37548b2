//! # sqlbridge
//!
//! Structured records in, parameterized SQL out, run against PostgreSQL,
//! SQLite or DuckDB through one contract.
//!
//! ## Features
//!
//! - **Normalization**: turn a [`Value::Object`] into ordered columns and SQL-safe scalars
//! - **Synthesis**: `INSERT ... VALUES ... [RETURNING ...]` and `UPDATE ... SET ... WHERE ...;`
//!   with `$n` or `?` placeholders, values always bound, never inlined
//! - **Validation hooks**: per-instance insert and update validators that may reject or rewrite payloads
//! - **One contract, three engines**: [`DbInstance`] implemented by [`PgInstance`],
//!   [`SqliteInstance`] and [`DuckDbInstance`]
//! - **Logging**: every statement is emitted as a `tracing` event (target `sqlbridge.sql`)
//!
//! ## Example
//!
//! ```ignore
//! use sqlbridge::{DbInstance, InstanceOptions, Schema, SqliteInstance, TableSchemas, record};
//!
//! let options = InstanceOptions::new()
//!     .insert_validator(TableSchemas::new().table("users", Schema::new().required("name")))
//!     .update_validator(TableSchemas::new().table("users", Schema::new()).partial());
//! let db = SqliteInstance::with_options(rusqlite::Connection::open("app.db")?, options);
//!
//! db.insert("users", record! { "name" => "Jhon", "age" => 20 }, &[]).await?;
//! db.update("users", record! { "age" => 21 }, record! { "name" => "Jhon" }).await?;
//! let row = db.single("SELECT age FROM users WHERE name = ?", &["Jhon".into()]).await?;
//! ```
//!
//! ## Feature flags
//!
//! `postgres`, `sqlite` and `duckdb` each enable one adapter; all three are on by default.

pub mod backend;
#[cfg(feature = "postgres")]
pub mod client;
pub mod error;
pub mod instance;
mod log;
pub mod normalize;
pub mod row;
pub mod sql;
pub mod validate;
pub mod value;

pub use error::{DbError, DbResult};
pub use instance::{DbInstance, InsertOutcome, InstanceOptions, WriteReceipt};
pub use normalize::{NormalizedRecord, normalize};
pub use row::Row;
pub use sql::{GeneratedSql, PlaceholderStyle, build_insert, build_update};
pub use validate::{
    PayloadValidator, Schema, SharedValidator, TableSchemas, ValidationCode, ValidationError,
    ValidationErrors,
};
pub use value::{Record, SqlValue, Value, iso_timestamp};

#[cfg(feature = "postgres")]
pub use backend::postgres::PgInstance;
#[cfg(feature = "postgres")]
pub use client::GenericClient;

#[cfg(feature = "sqlite")]
pub use backend::sqlite::SqliteInstance;

#[cfg(feature = "duckdb")]
pub use backend::duckdb::DuckDbInstance;
