//! Common error types for the Chinook reporting pipeline
//!
//! Every variant except `Config` is fatal for a pipeline run: there is no
//! retry path, the orchestrator logs the failure and surfaces it to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the pipeline crates
#[derive(Error, Debug)]
pub enum Error {
    /// Store unreachable, misconfigured, or missing a table/column the joins need
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed request parameter or a query the store rejected
    #[error("Query error: {0}")]
    Query(String),

    /// Bad caller parameter (e.g. top-N below 1)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Destination could not be written
    #[error("Write error: {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied deadline passed before the named step could start
    #[error("Deadline exceeded before step '{0}'")]
    DeadlineExceeded(String),
}

impl Error {
    /// Wrap an I/O failure against an output destination
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Write {
            path: path.into(),
            source,
        }
    }

    /// Short taxonomy label used in log records
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Connection(_) => "ConnectionError",
            Error::Query(_) => "QueryError",
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::Write { .. } => "WriteError",
            Error::Config(_) => "ConfigError",
            Error::DeadlineExceeded(_) => "DeadlineExceeded",
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Error::Connection(err.to_string()),
            sqlx::Error::Database(db_err) if is_schema_failure(db_err.message()) => {
                Error::Connection(err.to_string())
            }
            // SQLITE_CANTOPEN (14) surfaces as a database error on connect
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("14") => {
                Error::Connection(err.to_string())
            }
            _ => Error::Query(err.to_string()),
        }
    }
}

/// SQLite reports schema mismatches only through the message text
#[cfg(feature = "sqlx")]
fn is_schema_failure(message: &str) -> bool {
    message.contains("no such table") || message.contains("no such column")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(Error::Connection("x".into()).kind(), "ConnectionError");
        assert_eq!(Error::Query("x".into()).kind(), "QueryError");
        assert_eq!(Error::InvalidArgument("x".into()).kind(), "InvalidArgument");
        let write = Error::write(
            "/tmp/out.csv",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(write.kind(), "WriteError");
        assert!(write.to_string().contains("/tmp/out.csv"));
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn test_sqlx_classification() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::Connection(_)));

        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Query(_)));

        let err: Error = sqlx::Error::ColumnNotFound("Quantity".into()).into();
        assert!(matches!(err, Error::Query(_)));
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn test_schema_failure_detection() {
        assert!(is_schema_failure("no such table: invoice_items"));
        assert!(is_schema_failure("no such column: ii.Quantity"));
        assert!(!is_schema_failure("datatype mismatch"));
    }
}
