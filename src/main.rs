use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use market_dashboard::api::{router, ApiState, HealthState, LatencyStats};
use market_dashboard::config::{Config, SourceKind, CHANNEL_CAPACITY};
use market_dashboard::db::{self, HistoryWriter};
use market_dashboard::error::Result;
use market_dashboard::poller::{PollerSettings, SnapshotPoller};
use market_dashboard::source::{
    self,
    fixture::{demo_alert_rules, demo_holdings, demo_insights},
};
use market_dashboard::state::{DetailCache, SnapshotStore};
use market_dashboard::stats;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;

    // --- Market source (chosen once) ---
    let source = source::from_config(&cfg)?;
    info!(
        "Market source: {} ({})",
        source.name(),
        match cfg.source {
            SourceKind::Http => cfg.markets_api_url.as_str(),
            SourceKind::Fixture => "built-in demo data",
        }
    );

    // --- Shared state ---
    let store = SnapshotStore::new();
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    // --- Channels ---
    let (history_tx, history_rx) = mpsc::channel(CHANNEL_CAPACITY);

    // --- Spawn tasks ---

    // History writer
    let writer = HistoryWriter::new(
        pool.clone(),
        history_rx,
        Arc::clone(&health),
        cfg.history_retention_hours,
    );
    tokio::spawn(async move { writer.run().await });

    // Snapshot poller (first poll runs immediately)
    let (poller, refresh) = SnapshotPoller::new(
        Arc::clone(&source),
        Arc::clone(&store),
        Arc::clone(&health),
        PollerSettings::from_config(&cfg),
    );
    let poller = poller.with_history(history_tx);
    tokio::spawn(async move { poller.run().await });

    // Snapshot logger
    let log_store = Arc::clone(&store);
    let published = store.subscribe();
    tokio::spawn(async move { log_snapshots(log_store, published).await });

    // HTTP API server
    let api_state = ApiState {
        store,
        source,
        refresh,
        details: Arc::new(DetailCache::new(cfg.detail_stale_after)),
        charts: Arc::new(DetailCache::new(cfg.detail_stale_after)),
        pool,
        holdings: Arc::new(demo_holdings()),
        alert_rules: Arc::new(demo_alert_rules()),
        insights: Arc::new(demo_insights()),
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Logs a one-line market summary every time a new snapshot is published.
async fn log_snapshots(store: Arc<SnapshotStore>, mut published: watch::Receiver<u64>) {
    while published.changed().await.is_ok() {
        let Some(snapshot) = store.current() else {
            continue;
        };
        let o = stats::overview(&snapshot.records);
        info!(
            event = "SNAPSHOT",
            seq = snapshot.seq,
            markets = o.active_markets,
            gainers = o.gainers,
            losers = o.losers,
            "SNAPSHOT | markets: {} | cap: ${:.0} | vol: ${:.0} | btc dom: {:.1}% | 24h: {:+.2}%",
            o.active_markets,
            o.total_market_cap,
            o.total_volume,
            o.btc_dominance,
            o.market_cap_change_24h,
        );
    }
}
