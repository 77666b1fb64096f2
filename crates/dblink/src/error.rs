//! Error types for the database link.

use thiserror::Error;

/// Main error type for link, introspection, paging and procedure operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// The backend link could not be established or re-established.
    #[error("Connection error on data source '{data_source}': {message}")]
    Connection {
        data_source: String,
        message: String,
    },

    /// A statement was rejected or malformed.
    #[error("Query failed on data source '{data_source}': {message}")]
    Query {
        data_source: String,
        message: String,
        #[source]
        cause: Option<Box<DbError>>,
    },

    /// Metadata for a single table could not be read.
    #[error("Introspection of table {table} failed: {message}")]
    Introspection { table: String, message: String },

    /// A page or row index was out of bounds.
    #[error("{what} index {index} is out of range (valid: 0..={max})")]
    Range {
        what: &'static str,
        index: i64,
        max: i64,
    },

    /// Procedure invoked with the wrong number of values.
    #[error("Procedure {procedure} declares {expected} parameters but {actual} values were supplied")]
    ParameterCount {
        procedure: String,
        expected: usize,
        actual: usize,
    },

    /// Configuration error (invalid YAML, missing fields, unknown backend, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error reported by the backend driver itself.
    #[error("Driver error: {0}")]
    Driver(String),

    /// Native PostgreSQL client error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,
}

impl DbError {
    /// Create a Connection error for a data source.
    pub fn connection(data_source: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Connection {
            data_source: data_source.into(),
            message: message.into(),
        }
    }

    /// Create a Query error without an underlying cause.
    pub fn query(data_source: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Query {
            data_source: data_source.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Create an Introspection error for a table.
    pub fn introspection(table: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Introspection {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Range error.
    pub fn range(what: &'static str, index: i64, max: i64) -> Self {
        DbError::Range { what, index, max }
    }

    /// Attach the owning data source to a failure.
    ///
    /// Errors that already carry a data source, as well as range, parameter
    /// and cancellation errors, pass through unchanged.
    pub fn on_source(self, data_source: &str) -> Self {
        match self {
            DbError::Connection { .. }
            | DbError::Query { .. }
            | DbError::Introspection { .. }
            | DbError::Range { .. }
            | DbError::ParameterCount { .. }
            | DbError::Config(_)
            | DbError::Cancelled => self,
            other => DbError::Query {
                data_source: data_source.to_string(),
                message: other.to_string(),
                cause: Some(Box::new(other)),
            },
        }
    }

    /// Map the error onto a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            DbError::Config(_) | DbError::Yaml(_) => 2,
            DbError::Connection { .. } => 3,
            DbError::Range { .. } | DbError::ParameterCount { .. } => 4,
            DbError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for link operations.
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_source_wraps_driver_errors() {
        let err = DbError::Driver("syntax error at or near \"SELEC\"".into()).on_source("warehouse");
        match &err {
            DbError::Query {
                data_source, cause, ..
            } => {
                assert_eq!(data_source, "warehouse");
                assert!(cause.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.format_detailed().contains("Caused by:"));
    }

    #[test]
    fn test_on_source_keeps_range_errors() {
        let err = DbError::range("page", 7, 3).on_source("warehouse");
        assert!(matches!(err, DbError::Range { index: 7, max: 3, .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_on_source_does_not_double_wrap() {
        let err = DbError::query("a", "boom").on_source("b");
        match err {
            DbError::Query { data_source, .. } => assert_eq!(data_source, "a"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
