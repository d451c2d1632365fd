//! Ranker: deterministic top-N selection over a grouped table

use crate::model::AggregateRow;
use chinook_common::{Error, Result};
use std::cmp::Ordering;

/// Ranking order: `total_sales` descending, then key ascending
pub fn ranking_order(a: &AggregateRow, b: &AggregateRow) -> Ordering {
    b.total_sales
        .total_cmp(&a.total_sales)
        .then_with(|| a.key.cmp(&b.key))
}

/// Top `n` rows by total sales
///
/// Fails with `InvalidArgument` if `n < 1`. With fewer than `n` rows the whole
/// table is returned, sorted.
pub fn top_n(rows: &[AggregateRow], n: i64) -> Result<Vec<AggregateRow>> {
    if n < 1 {
        return Err(Error::InvalidArgument(format!(
            "top-N cutoff must be at least 1, got {}",
            n
        )));
    }

    let mut ranked = rows.to_vec();
    ranked.sort_by(ranking_order);
    ranked.truncate(usize::try_from(n).unwrap_or(usize::MAX));
    Ok(ranked)
}
