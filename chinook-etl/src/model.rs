//! Row types flowing through the pipeline
//!
//! Source rows ([`SaleLineItem`], [`CatalogTrack`]) are read-only snapshots of
//! the store. Derived rows ([`AggregateRow`], [`GenreTrackCount`]) are what the
//! sink writes.

use chinook_common::{Error, Result};
use chrono::{Datelike, NaiveDateTime};
use std::fmt;

/// One invoice line as read from the store
///
/// Artist and genre fields are only populated when the request joined the
/// corresponding dimension tables.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleLineItem {
    pub invoice_id: i64,
    pub track_id: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub invoice_timestamp: NaiveDateTime,
    pub album_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub artist_name: Option<String>,
    pub genre_id: Option<i64>,
    pub genre_name: Option<String>,
}

impl SaleLineItem {
    /// Revenue for this line (`quantity * unit_price`)
    pub fn line_total(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }
}

/// A catalog track with its genre, used for track counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTrack {
    pub track_id: i64,
    pub genre_name: String,
}

/// Calendar grouping key derived from an invoice timestamp
///
/// Ordering follows the calendar, which matches the lexical order of the
/// rendered keys because years are zero-padded to four digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeBucket {
    Month { year: i32, month: u32 },
    Quarter { year: i32, quarter: u32 },
    Year(i32),
}

impl TimeBucket {
    pub fn month_of(ts: &NaiveDateTime) -> Self {
        TimeBucket::Month {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// Q1=Jan–Mar, Q2=Apr–Jun, Q3=Jul–Sep, Q4=Oct–Dec
    pub fn quarter_of(ts: &NaiveDateTime) -> Self {
        TimeBucket::Quarter {
            year: ts.year(),
            quarter: (ts.month() + 2) / 3,
        }
    }

    pub fn year_of(ts: &NaiveDateTime) -> Self {
        TimeBucket::Year(ts.year())
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBucket::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            TimeBucket::Quarter { year, quarter } => write!(f, "{:04}-Q{}", year, quarter),
            TimeBucket::Year(year) => write!(f, "{:04}", year),
        }
    }
}

/// Attribute that sales rows are summarized by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Month,
    Quarter,
    Year,
    Artist,
    Genre,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Month => "month",
            Dimension::Quarter => "quarter",
            Dimension::Year => "year",
            Dimension::Artist => "artist",
            Dimension::Genre => "genre",
        }
    }

    /// Whether rows must be joined through tracks/albums to artists
    pub fn needs_artist(&self) -> bool {
        matches!(self, Dimension::Artist)
    }

    /// Whether rows must be joined through tracks to genres
    pub fn needs_genre(&self) -> bool {
        matches!(self, Dimension::Genre)
    }

    /// SQL expression producing the grouping key
    ///
    /// Must render exactly what [`Dimension::key_for`] renders for the same row.
    pub fn key_sql(&self) -> &'static str {
        match self {
            Dimension::Month => "strftime('%Y-%m', i.InvoiceDate)",
            Dimension::Quarter => {
                "strftime('%Y', i.InvoiceDate) || '-Q' || \
                 ((CAST(strftime('%m', i.InvoiceDate) AS INTEGER) + 2) / 3)"
            }
            Dimension::Year => "strftime('%Y', i.InvoiceDate)",
            Dimension::Artist => "COALESCE(ar.Name, '')",
            Dimension::Genre => "COALESCE(g.Name, '')",
        }
    }

    /// Grouping key for one raw row
    pub fn key_for(&self, item: &SaleLineItem) -> String {
        match self {
            Dimension::Month => TimeBucket::month_of(&item.invoice_timestamp).to_string(),
            Dimension::Quarter => TimeBucket::quarter_of(&item.invoice_timestamp).to_string(),
            Dimension::Year => TimeBucket::year_of(&item.invoice_timestamp).to_string(),
            Dimension::Artist => item.artist_name.clone().unwrap_or_default(),
            Dimension::Genre => item.genre_name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a grouped sales table
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// Time bucket, artist name, or genre name
    pub key: String,
    pub total_quantity: i64,
    /// Sum of `quantity * unit_price`, rounded to 2 decimal places
    pub total_sales: f64,
}

/// Number of catalog tracks in one genre
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreTrackCount {
    pub genre: String,
    pub tracks: i64,
}

/// Round half away from zero to 2 decimal places, the way SQLite `ROUND(x, 2)` does
///
/// SQLite rounds the decimal rendering of the value, not its binary expansion,
/// so the scaled value is first cut to 15 significant digits: `1.005` becomes
/// `1.01` here and in SQL alike.
pub fn round_cents(value: f64) -> f64 {
    let scaled = value * 100.0;
    let decimal = format!("{:.14e}", scaled).parse::<f64>().unwrap_or(scaled);
    decimal.round() / 100.0
}

/// SQL expression normalizing `InvoiceDate` to [`INVOICE_TIMESTAMP_FORMAT`]
///
/// NULL when SQLite cannot read the value, which is exactly when the
/// time-bucket keys of the grouped query are NULL.
pub const INVOICE_TIMESTAMP_SQL: &str = "strftime('%Y-%m-%d %H:%M:%S', i.InvoiceDate)";

/// Shape of the normalized timestamp
pub const INVOICE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp already normalized by [`INVOICE_TIMESTAMP_SQL`]
pub fn parse_invoice_timestamp(normalized: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(normalized, INVOICE_TIMESTAMP_FORMAT).ok()
}

/// Parse or fail with a `QueryError` naming the invoice
///
/// `normalized` is `None` when SQLite itself rejected `raw`.
pub fn require_invoice_timestamp(
    invoice_id: i64,
    raw: &str,
    normalized: Option<&str>,
) -> Result<NaiveDateTime> {
    normalized
        .and_then(parse_invoice_timestamp)
        .ok_or_else(|| {
            Error::Query(format!(
                "Invoice {} has an unparseable InvoiceDate '{}'",
                invoice_id, raw
            ))
        })
}
