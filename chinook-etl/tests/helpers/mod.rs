//! Chinook-shaped SQLite fixtures for integration tests
//!
//! The standard data set (see [`STANDARD_DATA`]) covers:
//! - quarter boundaries (2009-03-31 23:59:59 vs 2009-04-01 00:00:00)
//! - a zero-quantity line (invoice 4, track 7)
//! - an artist name containing a comma
//! - two artists tied on total sales (1.98)
//! - a genre with no tracks
//!
//! Expected aggregates for the standard data:
//!
//! | month   | qty | sales |
//! |---------|-----|-------|
//! | 2009-01 | 3   | 2.97  |
//! | 2009-02 | 2   | 1.98  |
//! | 2009-03 | 3   | 5.97  |
//! | 2009-04 | 1   | 0.99  |
//! | 2010-07 | 2   | 2.98  |
//! | 2010-12 | 5   | 4.95  |
//! | 2011-10 | 3   | 2.97  |

#![allow(dead_code)]

use chinook_common::config::{LoggingConfig, PipelineConfig};
use chinook_common::logging::build_log_sink;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::Dispatch;

pub const SCHEMA: &str = r#"
CREATE TABLE artists (
    ArtistId INTEGER PRIMARY KEY NOT NULL,
    Name NVARCHAR(120)
);
CREATE TABLE albums (
    AlbumId INTEGER PRIMARY KEY NOT NULL,
    Title NVARCHAR(160) NOT NULL,
    ArtistId INTEGER NOT NULL
);
CREATE TABLE genres (
    GenreId INTEGER PRIMARY KEY NOT NULL,
    Name NVARCHAR(120)
);
CREATE TABLE tracks (
    TrackId INTEGER PRIMARY KEY NOT NULL,
    Name NVARCHAR(200) NOT NULL,
    AlbumId INTEGER,
    GenreId INTEGER,
    UnitPrice NUMERIC(10,2) NOT NULL
);
CREATE TABLE invoices (
    InvoiceId INTEGER PRIMARY KEY NOT NULL,
    CustomerId INTEGER NOT NULL,
    InvoiceDate DATETIME NOT NULL,
    Total NUMERIC(10,2) NOT NULL
);
CREATE TABLE invoice_items (
    InvoiceLineId INTEGER PRIMARY KEY NOT NULL,
    InvoiceId INTEGER NOT NULL,
    TrackId INTEGER NOT NULL,
    UnitPrice NUMERIC(10,2) NOT NULL,
    Quantity INTEGER NOT NULL
);
"#;

pub const STANDARD_DATA: &str = r#"
INSERT INTO artists (ArtistId, Name) VALUES
    (1, 'AC/DC'),
    (2, 'Accept'),
    (3, 'Earth, Wind & Fire'),
    (4, 'Queen'),
    (5, 'Miles Davis');
INSERT INTO albums (AlbumId, Title, ArtistId) VALUES
    (1, 'For Those About To Rock', 1),
    (2, 'Balls to the Wall', 2),
    (3, 'Greatest Hits', 3),
    (4, 'Greatest Hits II', 4),
    (5, 'Kind of Blue', 5);
INSERT INTO genres (GenreId, Name) VALUES
    (1, 'Rock'),
    (2, 'Jazz'),
    (3, 'Metal'),
    (4, 'Soundtrack');
INSERT INTO tracks (TrackId, Name, AlbumId, GenreId, UnitPrice) VALUES
    (1, 'For Those About To Rock', 1, 1, 0.99),
    (2, 'Put The Finger On You', 1, 1, 0.99),
    (3, 'Balls to the Wall', 2, 3, 0.99),
    (4, 'September', 3, 1, 0.99),
    (5, 'Bohemian Rhapsody', 4, 1, 1.99),
    (6, 'So What', 5, 2, 0.99),
    (7, 'Blue in Green', 5, 2, 0.99),
    (8, 'Innuendo', 4, 1, 0.99);
INSERT INTO invoices (InvoiceId, CustomerId, InvoiceDate, Total) VALUES
    (1, 2, '2009-01-03 00:00:00', 2.97),
    (2, 4, '2009-02-11 00:00:00', 1.98),
    (3, 8, '2009-03-31 23:59:59', 5.97),
    (4, 14, '2009-04-01 00:00:00', 0.99),
    (5, 23, '2010-07-15 00:00:00', 2.98),
    (6, 37, '2010-12-31 12:00:00', 4.95),
    (7, 38, '2011-10-02 00:00:00', 2.97);
INSERT INTO invoice_items (InvoiceLineId, InvoiceId, TrackId, UnitPrice, Quantity) VALUES
    (1, 1, 1, 0.99, 1),
    (2, 1, 2, 0.99, 2),
    (3, 2, 3, 0.99, 1),
    (4, 2, 6, 0.99, 1),
    (5, 3, 5, 1.99, 3),
    (6, 4, 4, 0.99, 1),
    (7, 4, 7, 0.99, 0),
    (8, 5, 8, 0.99, 1),
    (9, 5, 5, 1.99, 1),
    (10, 6, 1, 0.99, 4),
    (11, 6, 6, 0.99, 1),
    (12, 7, 3, 0.99, 2),
    (13, 7, 4, 0.99, 1);
"#;

/// Three lines across two months: 2010-01 → (3, 25.00), 2010-02 → (3, 6.00)
pub const SCENARIO_DATA: &str = r#"
INSERT INTO artists (ArtistId, Name) VALUES (1, 'Scenario Artist');
INSERT INTO albums (AlbumId, Title, ArtistId) VALUES (1, 'Scenario Album', 1);
INSERT INTO genres (GenreId, Name) VALUES (1, 'Rock');
INSERT INTO tracks (TrackId, Name, AlbumId, GenreId, UnitPrice) VALUES
    (1, 'Ten', 1, 1, 10),
    (2, 'Five', 1, 1, 5),
    (3, 'Two', 1, 1, 2);
INSERT INTO invoices (InvoiceId, CustomerId, InvoiceDate, Total) VALUES
    (1, 1, '2010-01-15 00:00:00', 20),
    (2, 1, '2010-01-20 00:00:00', 5),
    (3, 1, '2010-02-01 00:00:00', 6);
INSERT INTO invoice_items (InvoiceLineId, InvoiceId, TrackId, UnitPrice, Quantity) VALUES
    (1, 1, 1, 10, 2),
    (2, 2, 2, 5, 1),
    (3, 3, 3, 2, 3);
"#;

/// Create a database at `path` by running `sql` (schema and data)
pub async fn create_db(path: &Path, sql: &str) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create fixture database");

    sqlx::raw_sql(sql)
        .execute(&pool)
        .await
        .expect("Failed to load fixture SQL");

    pool.close().await;
}

/// Temporary directory holding `chinook.db` built from `data`
///
/// TempDir must be kept alive for the duration of the test.
pub async fn fixture_db(data: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("chinook.db");
    create_db(&db_path, &format!("{}\n{}", SCHEMA, data)).await;
    (temp_dir, db_path)
}

pub async fn standard_db() -> (TempDir, PathBuf) {
    fixture_db(STANDARD_DATA).await
}

pub async fn scenario_db() -> (TempDir, PathBuf) {
    fixture_db(SCENARIO_DATA).await
}

pub async fn empty_db() -> (TempDir, PathBuf) {
    fixture_db("").await
}

/// Pipeline config reading `db_path` and writing reports under `output_dir`
pub fn test_config(db_path: &Path, output_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.db.path = db_path.to_path_buf();
    config.reports.output_dir = output_dir.to_path_buf();
    config.logging = LoggingConfig {
        path: None,
        level: "warn".to_string(),
    };
    config
}

/// Stdout sink at warn level, keeps test output readable
pub fn quiet_sink() -> Dispatch {
    build_log_sink(&LoggingConfig {
        path: None,
        level: "warn".to_string(),
    })
    .expect("Failed to build log sink")
}

/// Assert two sales tables match on keys and quantities, sales within 0.01
pub fn assert_equivalent(
    label: &str,
    left: &[chinook_etl::AggregateRow],
    right: &[chinook_etl::AggregateRow],
) {
    assert_eq!(
        left.iter().map(|r| &r.key).collect::<Vec<_>>(),
        right.iter().map(|r| &r.key).collect::<Vec<_>>(),
        "{}: keys differ",
        label
    );
    for (l, r) in left.iter().zip(right) {
        assert_eq!(
            l.total_quantity, r.total_quantity,
            "{}: quantity differs for {}",
            label, l.key
        );
        assert!(
            (l.total_sales - r.total_sales).abs() <= 0.01 + 1e-9,
            "{}: sales differ for {}: {} vs {}",
            label,
            l.key,
            l.total_sales,
            r.total_sales
        );
    }
}
