//! Error types for sqlbridge

use crate::validate::ValidationErrors;
use thiserror::Error;

/// Result type alias for sqlbridge operations
pub type DbResult<T> = Result<T, DbError>;

/// Error types for normalization, synthesis and execution
#[derive(Debug, Error)]
pub enum DbError {
    /// Payload is not a structured object (or is an array)
    #[error("{label} {message}")]
    InvalidShape { label: String, message: String },

    /// Payload kept no column after normalization
    #[error("{label} must have at least one property")]
    EmptyPayload { label: String },

    /// Caller-supplied validator rejected the payload
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    /// `single` got more than one row on a backend that checks for it
    #[error("More than one row returned (got {0})")]
    MultipleRows(usize),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// PostgreSQL engine error
    #[cfg(feature = "postgres")]
    #[error("Query error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// SQLite engine error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// DuckDB engine error
    #[cfg(feature = "duckdb")]
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The blocking task running an embedded engine call failed
    #[error("Task join error: {0}")]
    Join(String),
}

impl DbError {
    /// Create an invalid-shape error for a labelled payload
    pub fn invalid_shape(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidShape {
            label: label.into(),
            message: message.into(),
        }
    }

    /// Create an empty-payload error for a labelled payload
    pub fn empty_payload(label: impl Into<String>) -> Self {
        Self::EmptyPayload {
            label: label.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Check if this is an empty-payload error
    pub fn is_empty_payload(&self) -> bool {
        matches!(self, Self::EmptyPayload { .. })
    }

    /// Check if this is an invalid-shape error
    pub fn is_invalid_shape(&self) -> bool {
        matches!(self, Self::InvalidShape { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this error came from the wrapped engine
    pub fn is_engine_error(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => true,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => true,
            #[cfg(feature = "duckdb")]
            Self::DuckDb(_) => true,
            _ => false,
        }
    }

    /// Label of the payload side this error refers to (`data` or `where`), if any
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::InvalidShape { label, .. } | Self::EmptyPayload { label } => Some(label),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for DbError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DbError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_names_the_side() {
        assert_eq!(
            DbError::empty_payload("where").to_string(),
            "where must have at least one property"
        );
        assert!(DbError::empty_payload("data").is_empty_payload());
    }

    #[test]
    fn invalid_shape_message() {
        let err = DbError::invalid_shape("data", "cannot be an array");
        assert_eq!(err.to_string(), "data cannot be an array");
        assert_eq!(err.label(), Some("data"));
        assert!(!err.is_engine_error());
    }
}
