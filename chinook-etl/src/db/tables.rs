//! Schema verification for the tables the joins rely on

use chinook_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Tables and columns the source queries reference
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("invoices", &["InvoiceId", "InvoiceDate"]),
    ("invoice_items", &["InvoiceId", "TrackId", "UnitPrice", "Quantity"]),
    ("tracks", &["TrackId", "AlbumId", "GenreId"]),
    ("albums", &["AlbumId", "ArtistId"]),
    ("artists", &["ArtistId", "Name"]),
    ("genres", &["GenreId", "Name"]),
];

/// Check every required table/column exists
///
/// Returns `ConnectionError` listing everything missing, so one run reports
/// the whole schema problem instead of the first failing join.
pub async fn verify_schema(pool: &SqlitePool) -> Result<()> {
    let mut missing = Vec::new();

    for (table, columns) in REQUIRED_COLUMNS {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(pool)
            .await?;

        if rows.is_empty() {
            missing.push(format!("table {}", table));
            continue;
        }

        let present: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<_, _>>()?;

        for column in columns.iter() {
            if !present.iter().any(|name| name.eq_ignore_ascii_case(column)) {
                missing.push(format!("column {}.{}", table, column));
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Connection(format!(
            "Schema mismatch, missing: {}",
            missing.join(", ")
        )))
    }
}
