//! Source Reader: parameterized, read-only queries against the sales store
//!
//! Both aggregation strategies go through this reader. The join set and
//! filter clause for a request are built in one place ([`SourceRequest`]) so
//! the grouped and ungrouped queries always see the same row population.

use crate::db;
use crate::model::{
    require_invoice_timestamp, AggregateRow, CatalogTrack, Dimension, GenreTrackCount,
    SaleLineItem, INVOICE_TIMESTAMP_SQL,
};
use chinook_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Optional row filters applied at extraction time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filter {
    /// Calendar year of the invoice
    pub year: Option<i32>,
    /// Restrict to tracks by this artist
    pub artist_id: Option<i64>,
}

impl Filter {
    pub fn for_year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    /// Build a filter from untyped parameters (CLI, config strings)
    ///
    /// A non-numeric value is a `QueryError`.
    pub fn from_params(year: Option<&str>, artist_id: Option<&str>) -> Result<Self> {
        let year = year
            .map(|raw| {
                raw.trim()
                    .parse::<i32>()
                    .map_err(|_| Error::Query(format!("Malformed year parameter '{}'", raw)))
            })
            .transpose()?;
        let artist_id = artist_id
            .map(|raw| {
                raw.trim().parse::<i64>().map_err(|_| {
                    Error::Query(format!("Malformed artist id parameter '{}'", raw))
                })
            })
            .transpose()?;

        let filter = Self { year, artist_id };
        filter.validate()?;
        Ok(filter)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(year) = self.year {
            if !(1..=9999).contains(&year) {
                return Err(Error::Query(format!(
                    "Year parameter {} outside 1..=9999",
                    year
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.year, self.artist_id) {
            (None, None) => write!(f, "none"),
            (Some(y), None) => write!(f, "year={}", y),
            (None, Some(a)) => write!(f, "artist_id={}", a),
            (Some(y), Some(a)) => write!(f, "year={}, artist_id={}", y, a),
        }
    }
}

/// Declarative extraction request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRequest {
    pub dimension: Dimension,
    pub filter: Filter,
}

impl SourceRequest {
    pub fn new(dimension: Dimension, filter: Filter) -> Self {
        Self { dimension, filter }
    }

    fn joins_artist(&self) -> bool {
        self.dimension.needs_artist() || self.filter.artist_id.is_some()
    }

    fn joins_track(&self) -> bool {
        self.joins_artist() || self.dimension.needs_genre()
    }

    fn from_clause(&self) -> String {
        let mut sql = String::from(
            "FROM invoice_items ii \
             INNER JOIN invoices i ON i.InvoiceId = ii.InvoiceId",
        );
        if self.joins_track() {
            sql.push_str(" INNER JOIN tracks t ON t.TrackId = ii.TrackId");
        }
        if self.joins_artist() {
            sql.push_str(
                " INNER JOIN albums al ON al.AlbumId = t.AlbumId \
                 INNER JOIN artists ar ON ar.ArtistId = al.ArtistId",
            );
        }
        if self.dimension.needs_genre() {
            sql.push_str(" INNER JOIN genres g ON g.GenreId = t.GenreId");
        }
        sql
    }

    fn where_clause(&self) -> String {
        let mut conditions = Vec::new();
        if self.filter.year.is_some() {
            conditions.push("strftime('%Y', i.InvoiceDate) = ?");
        }
        if self.filter.artist_id.is_some() {
            conditions.push("ar.ArtistId = ?");
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    /// Ungrouped line items for client-side aggregation
    fn line_items_sql(&self) -> String {
        let artist_cols = if self.joins_artist() {
            "al.AlbumId AS AlbumId, ar.ArtistId AS ArtistId, CAST(ar.Name AS TEXT) AS ArtistName"
        } else {
            "NULL AS AlbumId, NULL AS ArtistId, NULL AS ArtistName"
        };
        let genre_cols = if self.dimension.needs_genre() {
            "g.GenreId AS GenreId, CAST(g.Name AS TEXT) AS GenreName"
        } else {
            "NULL AS GenreId, NULL AS GenreName"
        };

        format!(
            "SELECT ii.InvoiceId AS InvoiceId, \
                    ii.TrackId AS TrackId, \
                    CAST(ii.Quantity AS INTEGER) AS Quantity, \
                    CAST(ii.UnitPrice AS REAL) AS UnitPrice, \
                    CAST(i.InvoiceDate AS TEXT) AS InvoiceDate, \
                    {} AS InvoiceTimestamp, \
                    {}, {} \
             {}{} \
             ORDER BY ii.InvoiceId, ii.TrackId, ii.Quantity, ii.UnitPrice",
            INVOICE_TIMESTAMP_SQL,
            artist_cols,
            genre_cols,
            self.from_clause(),
            self.where_clause()
        )
    }

    /// Grouped and summed rows for query-side aggregation
    fn grouped_sales_sql(&self) -> String {
        format!(
            "SELECT {} AS GroupKey, \
                    CAST(SUM(ii.Quantity) AS INTEGER) AS Quantity, \
                    CAST(ROUND(SUM(ii.Quantity * ii.UnitPrice), 2) AS REAL) AS TotalSales \
             {}{} \
             GROUP BY GroupKey \
             ORDER BY GroupKey ASC",
            self.dimension.key_sql(),
            self.from_clause(),
            self.where_clause()
        )
    }

    fn bind_filter<'q>(
        &self,
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        if let Some(year) = self.filter.year {
            query = query.bind(format!("{:04}", year));
        }
        if let Some(artist_id) = self.filter.artist_id {
            query = query.bind(artist_id);
        }
        query
    }
}

impl fmt::Display for SourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dimension={}, filter={}", self.dimension, self.filter)
    }
}

/// Read-only handle on the transactional store
///
/// Created once per run and released with [`SourceReader::close`].
pub struct SourceReader {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SourceReader {
    /// Open the store read-only and verify the schema the joins need
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect_readonly(db_path).await?;
        if let Err(e) = db::verify_schema(&pool).await {
            pool.close().await;
            return Err(e);
        }
        info!("Connected to {} (read-only)", db_path.display());
        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Close the underlying connection
    pub async fn close(self) {
        self.pool.close().await;
        debug!("Closed connection to {}", self.db_path.display());
    }

    /// Raw, ungrouped line items joined for the request's dimension
    pub async fn line_items(&self, request: &SourceRequest) -> Result<Vec<SaleLineItem>> {
        request.filter.validate()?;
        self.check_dates_for(request).await?;
        let sql = request.line_items_sql();
        debug!(%request, "Fetching raw line items");

        let rows = request
            .bind_filter(sqlx::query(&sql))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let invoice_id: i64 = row.try_get("InvoiceId")?;
                let raw_date: String = row.try_get("InvoiceDate")?;
                let normalized: Option<String> = row.try_get("InvoiceTimestamp")?;
                Ok(SaleLineItem {
                    invoice_id,
                    track_id: row.try_get("TrackId")?,
                    quantity: row.try_get("Quantity")?,
                    unit_price: row.try_get("UnitPrice")?,
                    invoice_timestamp: require_invoice_timestamp(
                        invoice_id,
                        &raw_date,
                        normalized.as_deref(),
                    )?,
                    album_id: row.try_get("AlbumId")?,
                    artist_id: row.try_get("ArtistId")?,
                    artist_name: row.try_get("ArtistName")?,
                    genre_id: row.try_get("GenreId")?,
                    genre_name: row.try_get("GenreName")?,
                })
            })
            .collect()
    }

    /// Rows grouped and summed by the store's query engine
    pub async fn grouped_sales(&self, request: &SourceRequest) -> Result<Vec<AggregateRow>> {
        request.filter.validate()?;
        self.check_dates_for(request).await?;
        let sql = request.grouped_sales_sql();
        debug!(%request, "Fetching query-side aggregate");

        let rows = request
            .bind_filter(sqlx::query(&sql))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let key: Option<String> = row.try_get("GroupKey")?;
                let key = key.ok_or_else(|| {
                    Error::Query(format!(
                        "Rows could not be bucketed by {} (unparseable InvoiceDate)",
                        request.dimension
                    ))
                })?;
                Ok(AggregateRow {
                    key,
                    total_quantity: row.try_get("Quantity")?,
                    total_sales: row.try_get("TotalSales")?,
                })
            })
            .collect()
    }

    /// Year predicates are NULL for unreadable dates; fail instead of dropping rows
    async fn check_dates_for(&self, request: &SourceRequest) -> Result<()> {
        if request.filter.year.is_some() {
            self.check_invoice_dates().await?;
        }
        Ok(())
    }

    /// `QueryError` if any invoice has an `InvoiceDate` SQLite cannot read
    async fn check_invoice_dates(&self) -> Result<()> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS Unreadable, MIN(InvoiceId) AS FirstInvoice \
             FROM invoices WHERE strftime('%Y', InvoiceDate) IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        let unreadable: i64 = row.try_get("Unreadable")?;
        if unreadable == 0 {
            return Ok(());
        }
        let first: Option<i64> = row.try_get("FirstInvoice")?;
        Err(Error::Query(format!(
            "{} invoice(s) have an unparseable InvoiceDate (first: invoice {})",
            unreadable,
            first.unwrap_or_default()
        )))
    }

    /// Every catalog track that has a genre
    pub async fn catalog_tracks(&self) -> Result<Vec<CatalogTrack>> {
        let rows = sqlx::query(
            r#"
            SELECT t.TrackId AS TrackId,
                   CAST(COALESCE(g.Name, '') AS TEXT) AS GenreName
            FROM tracks t
            INNER JOIN genres g ON g.GenreId = t.GenreId
            ORDER BY t.TrackId
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CatalogTrack {
                    track_id: row.try_get("TrackId")?,
                    genre_name: row.try_get("GenreName")?,
                })
            })
            .collect()
    }

    /// Track counts per genre computed by the store
    pub async fn grouped_track_counts(&self) -> Result<Vec<GenreTrackCount>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(COALESCE(g.Name, '') AS TEXT) AS GenreName,
                   COUNT(t.TrackId) AS NumberOfTracks
            FROM tracks t
            INNER JOIN genres g ON g.GenreId = t.GenreId
            GROUP BY GenreName
            ORDER BY GenreName ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(GenreTrackCount {
                    genre: row.try_get("GenreName")?,
                    tracks: row.try_get("NumberOfTracks")?,
                })
            })
            .collect()
    }

    /// Most recent invoice year, `None` when there are no invoices
    pub async fn latest_invoice_year(&self) -> Result<Option<i32>> {
        self.check_invoice_dates().await?;
        let year: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(CAST(strftime('%Y', InvoiceDate) AS INTEGER)) FROM invoices",
        )
        .fetch_one(&self.pool)
        .await?;

        year.map(|y| {
            i32::try_from(y).map_err(|_| Error::Query(format!("Invoice year {} out of range", y)))
        })
        .transpose()
    }
}
