use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::config::panel_limits;
use crate::db;
use crate::error::{AppError, Result};
use crate::poller::{RefreshHandle, RefreshOutcome};
use crate::query::{self, QueryParams, QueryResult};
use crate::source::MarketSource;
use crate::state::{DetailCache, PollError, Snapshot, SnapshotStore};
use crate::stats;
use crate::types::{
    AiInsight, AlertRule, ChartPoint, DashboardOverview, Holding, MarketAlert, MarketDetail,
    MarketRecord, PortfolioSummary, SearchHit, Timeframe, TrendingMarket,
};

/// Fewer recorded points than this and the chart falls back to the source.
const MIN_RECORDED_POINTS: usize = 2;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<SnapshotStore>,
    pub source: Arc<dyn MarketSource>,
    pub refresh: RefreshHandle,
    pub details: Arc<DetailCache<MarketDetail>>,
    pub charts: Arc<DetailCache<Vec<ChartPoint>>>,
    pub pool: SqlitePool,
    pub holdings: Arc<Vec<Holding>>,
    pub alert_rules: Arc<Vec<AlertRule>>,
    pub insights: Arc<Vec<AiInsight>>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/markets", get(get_markets))
        .route("/markets/search", get(search_markets))
        .route("/markets/refresh", post(refresh_markets))
        .route("/markets/:symbol", get(get_market))
        .route("/markets/:symbol/details", get(get_market_details))
        .route("/markets/:symbol/chart", get(get_market_chart))
        .route("/markets/:symbol/related", get(get_related_markets))
        .route("/dashboard/overview", get(get_overview))
        .route("/dashboard/trending", get(get_trending))
        .route("/portfolio/summary", get(get_portfolio_summary))
        .route("/alerts/recent", get(get_recent_alerts))
        .route("/ai/insights", get(get_ai_insights))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct ChartQuery {
    pub timeframe: Option<String>,
}

#[derive(Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize)]
pub struct InsightsQuery {
    pub symbol: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResponse {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// `history` when served from recorded snapshots, else `source`.
    pub origin: &'static str,
    pub points: Vec<ChartPoint>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub source: &'static str,
    pub snapshot_seq: Option<u64>,
    pub snapshot_age_secs: Option<f64>,
    pub records: usize,
    pub last_error: Option<PollError>,
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub last_success_ms: Option<i64>,
    pub history_pending: u64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The current snapshot, or 503 carrying the most recent poll error.
fn current_snapshot(state: &ApiState) -> Result<Arc<Snapshot>> {
    let status = state.store.status();
    status.snapshot.ok_or_else(|| {
        let reason = status
            .last_error
            .map(|e| e.message)
            .unwrap_or_else(|| "no snapshot has been fetched yet".to_string());
        AppError::NoData(reason)
    })
}

fn find_market(snapshot: &Snapshot, symbol: &str) -> Result<MarketRecord> {
    snapshot
        .find(symbol)
        .cloned()
        .ok_or_else(|| AppError::NotFound(symbol.to_uppercase()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_markets(
    State(state): State<ApiState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResult>> {
    let snapshot = current_snapshot(&state)?;

    let started = Instant::now();
    let result = query::run_params(&snapshot.records, params)?;
    state.latency.record(started.elapsed());

    debug!(seq = snapshot.seq, returned = result.len(), total = result.total, "Markets query");
    Ok(Json(result))
}

async fn search_markets(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>> {
    let snapshot = current_snapshot(&state)?;

    let started = Instant::now();
    let hits = stats::search_hits(&snapshot.records, &params.q);
    state.latency.record(started.elapsed());

    Ok(Json(hits))
}

async fn get_market(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Result<Json<MarketRecord>> {
    let snapshot = current_snapshot(&state)?;
    Ok(Json(find_market(&snapshot, &symbol)?))
}

async fn get_market_details(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Result<Json<MarketDetail>> {
    let key = symbol.to_uppercase();
    let source = Arc::clone(&state.source);
    let fetch_symbol = key.clone();
    let detail = state
        .details
        .get_or_fetch(&key, || async move { source.fetch_detail(&fetch_symbol).await })
        .await?;
    Ok(Json(detail))
}

async fn get_market_chart(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
    Query(params): Query<ChartQuery>,
) -> Result<Json<ChartResponse>> {
    let timeframe = match params.timeframe.as_deref() {
        None | Some("") => Timeframe::default(),
        Some(s) => s.parse()?,
    };
    let symbol = symbol.to_uppercase();

    match db::load_chart(&state.pool, &symbol, timeframe).await {
        Ok(points) if points.len() >= MIN_RECORDED_POINTS => {
            return Ok(Json(ChartResponse {
                symbol,
                timeframe,
                origin: "history",
                points,
            }));
        }
        Ok(_) => {}
        Err(e) => warn!(symbol = %symbol, "Chart history read failed, using source: {e}"),
    }

    let key = format!("{symbol}:{timeframe}");
    let source = Arc::clone(&state.source);
    let fetch_symbol = symbol.clone();
    let points = state
        .charts
        .get_or_fetch(&key, || async move { source.fetch_chart(&fetch_symbol, timeframe).await })
        .await?;

    Ok(Json(ChartResponse {
        symbol,
        timeframe,
        origin: "source",
        points,
    }))
}

async fn get_related_markets(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Result<Json<Vec<MarketRecord>>> {
    let snapshot = current_snapshot(&state)?;
    stats::related(&snapshot.records, &symbol)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(symbol.to_uppercase()))
}

async fn get_overview(State(state): State<ApiState>) -> Result<Json<DashboardOverview>> {
    let snapshot = current_snapshot(&state)?;
    Ok(Json(stats::overview(&snapshot.records)))
}

async fn get_trending(State(state): State<ApiState>) -> Result<Json<Vec<TrendingMarket>>> {
    let snapshot = current_snapshot(&state)?;
    Ok(Json(stats::trending(&snapshot.records, panel_limits::TRENDING)))
}

async fn get_portfolio_summary(State(state): State<ApiState>) -> Result<Json<PortfolioSummary>> {
    let snapshot = current_snapshot(&state)?;
    Ok(Json(stats::value_portfolio(&state.holdings, &snapshot.records)))
}

async fn get_recent_alerts(State(state): State<ApiState>) -> Result<Json<Vec<MarketAlert>>> {
    let snapshot = current_snapshot(&state)?;
    Ok(Json(stats::evaluate_alerts(
        &state.alert_rules,
        &snapshot.records,
        snapshot.fetched_at,
    )))
}

async fn get_ai_insights(
    State(state): State<ApiState>,
    Query(params): Query<InsightsQuery>,
) -> Json<Vec<AiInsight>> {
    Json(stats::insights_for(&state.insights, params.symbol.as_deref()))
}

async fn refresh_markets(
    State(state): State<ApiState>,
    Query(params): Query<RefreshQuery>,
) -> Result<Json<RefreshOutcome>> {
    Ok(Json(state.refresh.refresh(params.force).await?))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let status = state.store.status();
    let health_label = match (&status.snapshot, &status.last_error) {
        (None, _) => "no_data",
        (Some(_), Some(_)) => "degraded",
        (Some(_), None) => "ok",
    };

    Json(HealthResponse {
        status: health_label,
        source: state.source.name(),
        snapshot_seq: status.snapshot.as_ref().map(|s| s.seq),
        snapshot_age_secs: status.snapshot.as_ref().map(|s| s.age().as_secs_f64()),
        records: status.snapshot.as_ref().map_or(0, |s| s.records.len()),
        last_error: status.last_error,
        polls_ok: state.health.polls_ok(),
        polls_failed: state.health.polls_failed(),
        last_success_ms: state.health.last_success_ms(),
        history_pending: state.health.history_pending(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::db::memory_pool;
    use crate::poller::{PollerSettings, SnapshotPoller};
    use crate::source::fixture::{demo_alert_rules, demo_holdings, demo_insights};
    use crate::source::FixtureSource;

    fn settings() -> PollerSettings {
        PollerSettings {
            interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(60),
            retry_backoff: vec![],
        }
    }

    /// State over the demo markets. With `spawn_poller` false nothing ever
    /// publishes, so data routes see an empty store.
    async fn test_state(spawn_poller: bool) -> ApiState {
        let source: Arc<dyn MarketSource> = Arc::new(FixtureSource::new());
        let store = SnapshotStore::new();
        let health = Arc::new(HealthState::new());
        let (poller, refresh) =
            SnapshotPoller::new(Arc::clone(&source), Arc::clone(&store), Arc::clone(&health), settings());

        if spawn_poller {
            let mut published = store.subscribe();
            tokio::spawn(poller.run());
            published.changed().await.unwrap();
        }

        ApiState {
            store,
            source,
            refresh,
            details: Arc::new(DetailCache::new(Duration::from_secs(60))),
            charts: Arc::new(DetailCache::new(Duration::from_secs(60))),
            pool: memory_pool().await,
            holdings: Arc::new(demo_holdings()),
            alert_rules: Arc::new(demo_alert_rules()),
            insights: Arc::new(demo_insights()),
            health,
            latency: Arc::new(LatencyStats::new()),
        }
    }

    async fn send(state: ApiState, method: &str, uri: &str) -> (StatusCode, Value) {
        let resp = router(state)
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
        (status, body)
    }

    fn record_symbols(body: &Value) -> Vec<&str> {
        body["records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["symbol"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn markets_default_view_is_rank_ascending() {
        let state = test_state(true).await;
        let (status, body) = send(state.clone(), "GET", "/markets").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record_symbols(&body), ["BTC", "ETH", "SOL", "ADA", "AVAX"]);
        assert_eq!(body["total"], 5);
        assert_eq!(state.latency.summary().samples, 1);
    }

    #[tokio::test]
    async fn markets_filters_sort_and_search_compose() {
        let state = test_state(true).await;
        let (_, body) = send(
            state.clone(),
            "GET",
            "/markets?minPrice=1&sortBy=change24h&sortOrder=desc",
        )
        .await;
        assert_eq!(record_symbols(&body), ["BTC", "SOL", "AVAX", "ETH"]);

        let (_, body) = send(state.clone(), "GET", "/markets?q=AN").await;
        assert_eq!(record_symbols(&body), ["SOL", "ADA", "AVAX"]);

        let (_, body) = send(state, "GET", "/markets?minMarketCap=20000000000&maxMarketCap=400000000000").await;
        assert_eq!(record_symbols(&body), ["ETH", "SOL"]);
    }

    #[tokio::test]
    async fn invalid_sort_key_is_bad_request() {
        let state = test_state(true).await;
        let (status, _) = send(state.clone(), "GET", "/markets?sortBy=name").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(state, "GET", "/markets?sortOrder=sideways").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn data_routes_are_unavailable_before_first_snapshot() {
        let state = test_state(false).await;
        for uri in ["/markets", "/dashboard/overview", "/markets/BTC", "/portfolio/summary", "/alerts/recent"] {
            let (status, _) = send(state.clone(), "GET", uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        }
        let (status, body) = send(state, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "no_data");
    }

    #[tokio::test]
    async fn single_market_lookup() {
        let state = test_state(true).await;
        let (status, body) = send(state.clone(), "GET", "/markets/eth").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "ETH");
        assert_eq!(body["marketCap"], 318e9);

        let (status, _) = send(state, "GET", "/markets/DOGE").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_returns_hits_in_rank_order() {
        let state = test_state(true).await;
        let (_, body) = send(state, "GET", "/markets/search?q=a").await;
        let syms: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["symbol"].as_str().unwrap())
            .collect();
        assert_eq!(syms, ["SOL", "ADA", "AVAX"]);
    }

    #[tokio::test]
    async fn details_come_from_source_and_unknown_is_not_found() {
        let state = test_state(true).await;
        let (status, body) = send(state.clone(), "GET", "/markets/btc/details").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["allTimeHigh"], 69045.22);
        assert_eq!(state.details.len(), 1);

        let (status, _) = send(state, "GET", "/markets/DOGE/details").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chart_falls_back_to_source_without_history() {
        let state = test_state(true).await;
        let (status, body) = send(state.clone(), "GET", "/markets/BTC/chart?timeframe=1h").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["origin"], "source");
        assert_eq!(body["timeframe"], "1h");
        assert_eq!(body["points"].as_array().unwrap().len(), 13);

        let (status, _) = send(state, "GET", "/markets/BTC/chart?timeframe=2y").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chart_prefers_recorded_history() {
        let state = test_state(true).await;
        let now = chrono::Utc::now().timestamp_millis();
        for (offset, price) in [(120_000, 1.0), (60_000, 2.0)] {
            sqlx::query("INSERT INTO price_points (symbol, ts_ms, price, volume) VALUES ('BTC', ?, ?, 0)")
                .bind(now - offset)
                .bind(price)
                .execute(&state.pool)
                .await
                .unwrap();
        }
        let (_, body) = send(state, "GET", "/markets/BTC/chart").await;
        assert_eq!(body["origin"], "history");
        assert_eq!(body["timeframe"], "24h");
        assert_eq!(body["points"][1]["price"], 2.0);
    }

    #[tokio::test]
    async fn related_and_dashboard_panels() {
        let state = test_state(true).await;
        let (_, body) = send(state.clone(), "GET", "/markets/BTC/related").await;
        assert_eq!(body.as_array().unwrap().len(), 4);

        let (_, body) = send(state.clone(), "GET", "/dashboard/overview").await;
        assert_eq!(body["activeMarkets"], 5);

        let (_, body) = send(state.clone(), "GET", "/dashboard/trending").await;
        assert_eq!(body[0]["symbol"], "ADA");

        let (_, body) = send(state, "GET", "/portfolio/summary").await;
        assert_eq!(body["holdings"].as_array().unwrap().len(), 2);
        assert!(body["unpriced"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn alerts_and_insights_panels() {
        let state = test_state(true).await;
        let (status, body) = send(state.clone(), "GET", "/alerts/recent").await;
        assert_eq!(status, StatusCode::OK);
        let alerts = body.as_array().unwrap();
        assert_eq!(alerts.len(), 4);
        assert_eq!(alerts[0]["symbol"], "BTC");
        assert_eq!(alerts[0]["type"], "price_above");
        assert_eq!(alerts[0]["triggered"], true);
        assert!(alerts[0]["triggeredAt"].is_string());
        assert_eq!(alerts[1]["currentValue"], -3.11);
        assert!(alerts[3].get("triggeredAt").is_none());

        let (_, body) = send(state.clone(), "GET", "/ai/insights").await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, body) = send(state, "GET", "/ai/insights?symbol=eth").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["type"], "bearish");
    }

    #[tokio::test]
    async fn refresh_honours_staleness_and_force() {
        let state = test_state(true).await;
        let (status, body) = send(state.clone(), "POST", "/markets/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "fresh");
        assert_eq!(body["seq"], 1);

        let (_, body) = send(state.clone(), "POST", "/markets/refresh?force=true").await;
        assert_eq!(body["status"], "refreshed");
        assert_eq!(body["seq"], 2);

        let (_, body) = send(state, "GET", "/health").await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["snapshot_seq"], 2);
        assert_eq!(body["polls_ok"], 2);
        assert_eq!(body["source"], "fixture");
    }
}
