//! Aggregator: grouped sales tables in two interchangeable strategies
//!
//! - **Query-side** ([`QuerySide`]): grouping and summation run in SQLite.
//! - **Client-side** ([`ClientSide`]): raw line items are fetched, keyed, and
//!   summed here with [`group_rows`].
//!
//! Both strategies must produce the same keys, quantities, and (within
//! rounding) sales totals for any source data. Output is always ordered by key
//! ascending so downstream files are stable.

use crate::model::{
    round_cents, AggregateRow, CatalogTrack, Dimension, GenreTrackCount, SaleLineItem,
};
use crate::source::{Filter, SourceReader, SourceRequest};
use chinook_common::config::StrategyKind;
use chinook_common::Result;
use std::collections::BTreeMap;
use tracing::debug;

/// Where a grouped table is computed
#[async_trait::async_trait]
pub trait AggregationStrategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Sales grouped by the request's dimension, ordered by key
    async fn sales(
        &self,
        source: &SourceReader,
        request: &SourceRequest,
    ) -> Result<Vec<AggregateRow>>;

    /// Catalog track counts per genre, ordered by genre name
    async fn track_counts(&self, source: &SourceReader) -> Result<Vec<GenreTrackCount>>;
}

/// Aggregation pushed into the SQL query
#[derive(Debug, Clone, Copy, Default)]
pub struct QuerySide;

/// Aggregation over raw rows in memory
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientSide;

#[async_trait::async_trait]
impl AggregationStrategy for QuerySide {
    fn name(&self) -> &'static str {
        "query"
    }

    async fn sales(
        &self,
        source: &SourceReader,
        request: &SourceRequest,
    ) -> Result<Vec<AggregateRow>> {
        source.grouped_sales(request).await
    }

    async fn track_counts(&self, source: &SourceReader) -> Result<Vec<GenreTrackCount>> {
        source.grouped_track_counts().await
    }
}

#[async_trait::async_trait]
impl AggregationStrategy for ClientSide {
    fn name(&self) -> &'static str {
        "client"
    }

    async fn sales(
        &self,
        source: &SourceReader,
        request: &SourceRequest,
    ) -> Result<Vec<AggregateRow>> {
        let rows = source.line_items(request).await?;
        let dimension = request.dimension;
        Ok(group_rows(&rows, |item| dimension.key_for(item)))
    }

    async fn track_counts(&self, source: &SourceReader) -> Result<Vec<GenreTrackCount>> {
        let tracks = source.catalog_tracks().await?;
        Ok(count_tracks(&tracks))
    }
}

/// Strategy implementation for a configured kind
pub fn strategy_for(kind: StrategyKind) -> &'static dyn AggregationStrategy {
    match kind {
        StrategyKind::Query => &QuerySide,
        StrategyKind::Client => &ClientSide,
    }
}

/// Group raw line items by `key_fn` and sum quantity and revenue
///
/// Rows with zero quantity still create their group. Sales are summed
/// unrounded and rounded once per group.
pub fn group_rows<F>(rows: &[SaleLineItem], key_fn: F) -> Vec<AggregateRow>
where
    F: Fn(&SaleLineItem) -> String,
{
    let mut groups: BTreeMap<String, (i64, f64)> = BTreeMap::new();
    for item in rows {
        let entry = groups.entry(key_fn(item)).or_insert((0, 0.0));
        entry.0 += item.quantity;
        entry.1 += item.line_total();
    }

    groups
        .into_iter()
        .map(|(key, (total_quantity, sales))| AggregateRow {
            key,
            total_quantity,
            total_sales: round_cents(sales),
        })
        .collect()
}

/// Count catalog tracks per genre
pub fn count_tracks(tracks: &[CatalogTrack]) -> Vec<GenreTrackCount> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for track in tracks {
        *counts.entry(track.genre_name.as_str()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(genre, tracks)| GenreTrackCount {
            genre: genre.to_string(),
            tracks,
        })
        .collect()
}

/// Generic primitive behind the per-dimension functions
pub async fn aggregate(
    source: &SourceReader,
    request: &SourceRequest,
    strategy: &dyn AggregationStrategy,
) -> Result<Vec<AggregateRow>> {
    let rows = strategy.sales(source, request).await?;
    debug!(
        strategy = strategy.name(),
        %request,
        groups = rows.len(),
        "Aggregated sales"
    );
    Ok(rows)
}

pub async fn by_month(
    source: &SourceReader,
    filter: Filter,
    strategy: &dyn AggregationStrategy,
) -> Result<Vec<AggregateRow>> {
    aggregate(source, &SourceRequest::new(Dimension::Month, filter), strategy).await
}

pub async fn by_quarter(
    source: &SourceReader,
    filter: Filter,
    strategy: &dyn AggregationStrategy,
) -> Result<Vec<AggregateRow>> {
    aggregate(source, &SourceRequest::new(Dimension::Quarter, filter), strategy).await
}

pub async fn by_year(
    source: &SourceReader,
    filter: Filter,
    strategy: &dyn AggregationStrategy,
) -> Result<Vec<AggregateRow>> {
    aggregate(source, &SourceRequest::new(Dimension::Year, filter), strategy).await
}

pub async fn by_artist(
    source: &SourceReader,
    filter: Filter,
    strategy: &dyn AggregationStrategy,
) -> Result<Vec<AggregateRow>> {
    aggregate(source, &SourceRequest::new(Dimension::Artist, filter), strategy).await
}

pub async fn by_genre(
    source: &SourceReader,
    filter: Filter,
    strategy: &dyn AggregationStrategy,
) -> Result<Vec<AggregateRow>> {
    aggregate(source, &SourceRequest::new(Dimension::Genre, filter), strategy).await
}

/// Number of catalog tracks per genre
pub async fn tracks_by_genre(
    source: &SourceReader,
    strategy: &dyn AggregationStrategy,
) -> Result<Vec<GenreTrackCount>> {
    let counts = strategy.track_counts(source).await?;
    debug!(strategy = strategy.name(), genres = counts.len(), "Counted tracks by genre");
    Ok(counts)
}
