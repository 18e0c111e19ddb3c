use std::cmp::Ordering;

use crate::query::spec::{SortKey, SortOrder};
use crate::types::MarketRecord;

/// Orders two records by `sort_by`; `Desc` reverses the ascending result.
///
/// Equal keys compare `Equal` so a stable sort keeps input order. Float keys
/// use numeric ordering, so `-0.0` and `0.0` are equal; a normalized snapshot
/// holds no NaN.
pub fn compare(a: &MarketRecord, b: &MarketRecord, sort_by: SortKey, sort_order: SortOrder) -> Ordering {
    let asc = match sort_by {
        SortKey::Rank => a.rank.cmp(&b.rank),
        key => key
            .value(a)
            .partial_cmp(&key.value(b))
            .unwrap_or(Ordering::Equal),
    };
    match sort_order {
        SortOrder::Asc => asc,
        SortOrder::Desc => asc.reverse(),
    }
}
