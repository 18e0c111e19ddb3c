//! SQLite price history behind the chart endpoint.

pub mod models;
pub mod writer;

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::db::models::PricePointRow;
use crate::error::Result;
use crate::types::{ChartPoint, Timeframe};

pub use writer::HistoryWriter;

/// Open (creating if missing) the database file and apply migrations.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {db_path}");
    Ok(pool)
}

/// Recorded points for `symbol` within the timeframe, oldest first.
pub async fn load_chart(pool: &SqlitePool, symbol: &str, timeframe: Timeframe) -> Result<Vec<ChartPoint>> {
    let since_ms = (Utc::now() - timeframe.duration()).timestamp_millis();
    let rows: Vec<PricePointRow> = sqlx::query_as(
        r#"
        SELECT ts_ms, price, volume
        FROM price_points
        WHERE symbol = ? AND ts_ms >= ?
        ORDER BY ts_ms ASC
        "#,
    )
    .bind(symbol.to_uppercase())
    .bind(since_ms)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ChartPoint::from).collect())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // One connection: every `:memory:` connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}
