use crate::query::spec::QuerySpec;
use crate::types::MarketRecord;

/// True if `record` satisfies every constraint set in `spec`.
/// Unset bounds never exclude; bounds are taken literally (a negative or
/// contradictory bound just narrows the result).
pub fn matches(record: &MarketRecord, spec: &QuerySpec) -> bool {
    if let Some(category) = spec.category.as_deref() {
        if record.category.as_str() != category {
            return false;
        }
    }

    within(record.price, spec.min_price, spec.max_price)
        && within(record.volume_24h, spec.min_volume, spec.max_volume)
        && within(record.market_cap, spec.min_market_cap, spec.max_market_cap)
}

#[inline]
fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.map_or(true, |lo| value >= lo) && max.map_or(true, |hi| value <= hi)
}
