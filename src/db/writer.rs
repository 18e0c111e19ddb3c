use std::sync::Arc;

use chrono::Duration;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::api::health::HealthState;
use crate::error::Result;
use crate::state::Snapshot;

/// Receives published snapshots from the poller and appends them to the
/// price history. Runs as a dedicated background task so a slow disk never
/// delays publishing.
pub struct HistoryWriter {
    pool: SqlitePool,
    snapshot_rx: mpsc::Receiver<Arc<Snapshot>>,
    health: Arc<HealthState>,
    retention: Duration,
}

impl HistoryWriter {
    pub fn new(
        pool: SqlitePool,
        snapshot_rx: mpsc::Receiver<Arc<Snapshot>>,
        health: Arc<HealthState>,
        retention_hours: i64,
    ) -> Self {
        Self {
            pool,
            snapshot_rx,
            health,
            retention: Duration::hours(retention_hours),
        }
    }

    pub async fn run(mut self) {
        while let Some(snapshot) = self.snapshot_rx.recv().await {
            self.health.dec_history_pending();
            if let Err(e) = self.write_snapshot(&snapshot).await {
                error!(seq = snapshot.seq, "History write error: {e}");
            }
        }
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let ts_ms = snapshot.fetched_at.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        for m in &snapshot.records {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO price_points (symbol, ts_ms, price, volume)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&m.symbol)
            .bind(ts_ms)
            .bind(m.price)
            .bind(m.volume_24h)
            .execute(&mut *tx)
            .await?;
        }

        let cutoff_ms = (snapshot.fetched_at - self.retention).timestamp_millis();
        let pruned = sqlx::query("DELETE FROM price_points WHERE ts_ms < ?")
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(
            seq = snapshot.seq,
            records = snapshot.records.len(),
            pruned,
            "History snapshot written"
        );
        Ok(())
    }
}
