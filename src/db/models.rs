use crate::types::ChartPoint;

/// Row of the `price_points` table.
#[derive(Debug, sqlx::FromRow)]
pub struct PricePointRow {
    pub ts_ms: i64,
    pub price: f64,
    pub volume: f64,
}

impl From<PricePointRow> for ChartPoint {
    fn from(row: PricePointRow) -> Self {
        Self {
            timestamp: row.ts_ms,
            price: row.price,
            volume: row.volume,
        }
    }
}
