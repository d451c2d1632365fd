//! Sink Writer: CSV output with atomic replacement
//!
//! A table is written to a temporary file in the destination directory,
//! synced, then renamed over the destination. Readers see either the previous
//! file or the complete new one.

use crate::model::{AggregateRow, GenreTrackCount};
use chinook_common::config::ReportId;
use chinook_common::{Error, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// A row that can be rendered as CSV fields
pub trait CsvRecord {
    fn fields(&self) -> Vec<String>;
}

impl CsvRecord for AggregateRow {
    fn fields(&self) -> Vec<String> {
        vec![
            self.key.clone(),
            self.total_quantity.to_string(),
            format!("{:.2}", self.total_sales),
        ]
    }
}

impl CsvRecord for GenreTrackCount {
    fn fields(&self) -> Vec<String> {
        vec![self.genre.clone(), self.tracks.to_string()]
    }
}

/// Fixed column order per report
pub fn header_for(report: ReportId) -> &'static [&'static str] {
    match report {
        ReportId::SalesByMonth => &["Month", "Quantity", "TotalSales"],
        ReportId::SalesByQuarter => &["Quarter", "Quantity", "TotalSales"],
        ReportId::SalesByYear => &["Month", "Quantity", "MonthlySales"],
        ReportId::SalesByGenre => &["GenreName", "Quantity", "TotalSales"],
        ReportId::TopArtists => &["ArtistName", "Quantity", "TotalSales"],
        ReportId::TracksByGenre => &["GenreName", "NumberOfTracks"],
    }
}

/// Quote a field if it contains a delimiter, quote, or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render a whole table, header first, `\n` line endings
pub fn render_csv<R: CsvRecord>(header: &[&str], rows: &[R]) -> String {
    let mut out = String::new();
    let mut push_line = |fields: Vec<String>| {
        let line: Vec<String> = fields.iter().map(|f| escape_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    };

    push_line(header.iter().map(|h| h.to_string()).collect());
    for row in rows {
        push_line(row.fields());
    }
    out
}

/// Write `rows` to `path`, replacing any existing file atomically
///
/// The parent directory is created if missing. Any I/O failure is a
/// `WriteError`; nothing is retried.
pub fn write_table<R: CsvRecord>(path: &Path, header: &[&str], rows: &[R]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;

    let content = render_csv(header, rows);

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| Error::write(path, e))?;
    temp.write_all(content.as_bytes())
        .map_err(|e| Error::write(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::write(path, e))?;
    temp.persist(path).map_err(|e| Error::write(path, e.error))?;

    debug!(
        "Wrote {} rows ({} bytes) to {}",
        rows.len(),
        content.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sales(key: &str, quantity: i64, total: f64) -> AggregateRow {
        AggregateRow {
            key: key.to_string(),
            total_quantity: quantity,
            total_sales: total,
        }
    }

    #[test]
    fn test_render_monthly_table() {
        let rows = vec![sales("2010-01", 3, 25.0), sales("2010-02", 3, 6.0)];
        let csv = render_csv(header_for(ReportId::SalesByMonth), &rows);
        assert_eq!(
            csv,
            "Month,Quantity,TotalSales\n2010-01,3,25.00\n2010-02,3,6.00\n"
        );
    }

    #[test]
    fn test_fields_with_delimiters_are_quoted() {
        let rows = vec![
            sales("Earth, Wind & Fire", 1, 0.99),
            sales("The \"Boss\"", 2, 1.98),
        ];
        let csv = render_csv(header_for(ReportId::TopArtists), &rows);
        assert!(csv.contains("\"Earth, Wind & Fire\",1,0.99\n"));
        assert!(csv.contains("\"The \"\"Boss\"\"\",2,1.98\n"));
    }

    #[test]
    fn test_empty_table_writes_header_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tracks_by_genre.csv");

        write_table::<GenreTrackCount>(&path, header_for(ReportId::TracksByGenre), &[]).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "GenreName,NumberOfTracks\n"
        );
    }

    #[test]
    fn test_overwrite_replaces_previous_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("sales_by_month.csv");
        let header = header_for(ReportId::SalesByMonth);

        write_table(&path, header, &[sales("2009-01", 100, 99.0), sales("2009-02", 1, 1.0)])
            .unwrap();
        write_table(&path, header, &[sales("2010-01", 3, 25.0)]).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Month,Quantity,TotalSales\n2010-01,3,25.00\n"
        );

        // No temp files left behind in the destination directory
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_unwritable_destination_is_write_error() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where a directory is expected
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let path = blocker.join("out.csv");

        let result = write_table(&path, header_for(ReportId::SalesByMonth), &[sales("2010-01", 1, 1.0)]);
        assert!(matches!(result, Err(Error::Write { .. })));
    }
}
