//! Database access layer for chinook-etl
//!
//! All connections are read-only. The pool holds a single connection, so
//! every query of a run is serialized against one handle.

use chinook_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::debug;

mod tables;
pub use tables::verify_schema;

/// Connect to database with read-only mode
///
/// Fails with `ConnectionError` if the file does not exist or cannot be
/// opened. SQLite would otherwise report a missing file only on first query.
pub async fn connect_readonly(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        return Err(Error::Connection(format!(
            "Database not found: {}",
            db_path.display()
        )));
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| {
            Error::Connection(format!(
                "Failed to open {} in read-only mode: {}",
                db_path.display(),
                e
            ))
        })?;

    debug!("Opened read-only pool for {}", db_path.display());
    Ok(pool)
}
