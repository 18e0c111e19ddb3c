//! Derived views over a snapshot: market overview, top movers, related
//! markets, search hits, portfolio valuation and alert evaluation.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::config::panel_limits;
use crate::query::{self, QuerySpec, SortKey, SortOrder};
use crate::types::{
    AiInsight, AlertKind, AlertRule, DashboardOverview, Holding, MarketAlert, MarketRecord,
    PortfolioHolding, PortfolioSummary, SearchHit, TrendingMarket,
};

fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

pub fn overview(records: &[MarketRecord]) -> DashboardOverview {
    let total_market_cap: f64 = records.iter().map(|m| m.market_cap).sum();
    let total_volume: f64 = records.iter().map(|m| m.volume_24h).sum();

    let cap_of = |symbol: &str| {
        records
            .iter()
            .find(|m| m.symbol == symbol)
            .map_or(0.0, |m| m.market_cap)
    };

    let weighted_change: f64 = records
        .iter()
        .map(|m| m.market_cap * m.change_percent_24h)
        .sum();

    DashboardOverview {
        total_market_cap,
        total_volume,
        btc_dominance: percent(cap_of("BTC"), total_market_cap),
        eth_dominance: percent(cap_of("ETH"), total_market_cap),
        market_cap_change_24h: if total_market_cap == 0.0 {
            0.0
        } else {
            weighted_change / total_market_cap
        },
        active_markets: records.len(),
        gainers: records.iter().filter(|m| m.change_percent_24h > 0.0).count(),
        losers: records.iter().filter(|m| m.change_percent_24h < 0.0).count(),
    }
}

/// Top `limit` movers by 24h percent change. Ties stay in rank order.
pub fn trending(records: &[MarketRecord], limit: usize) -> Vec<TrendingMarket> {
    let mut by_rank: Vec<&MarketRecord> = records.iter().collect();
    by_rank.sort_by_key(|m| m.rank);
    by_rank.sort_by(|a, b| {
        b.change_percent_24h
            .partial_cmp(&a.change_percent_24h)
            .unwrap_or(Ordering::Equal)
    });
    by_rank.into_iter().take(limit).map(TrendingMarket::from).collect()
}

/// Same-category markets by rank, excluding `symbol` itself.
pub fn related(records: &[MarketRecord], symbol: &str) -> Option<Vec<MarketRecord>> {
    let subject = records
        .iter()
        .find(|m| m.symbol.eq_ignore_ascii_case(symbol))?;
    let spec = QuerySpec {
        category: Some(subject.category.as_str().to_string()),
        ..QuerySpec::default()
    };
    Some(
        query::run(records, &spec)
            .records
            .into_iter()
            .filter(|m| m.symbol != subject.symbol)
            .take(panel_limits::RELATED)
            .collect(),
    )
}

/// Quick-search dropdown: name/symbol matches in rank order. Blank text yields nothing.
pub fn search_hits(records: &[MarketRecord], text: &str) -> Vec<SearchHit> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let spec = QuerySpec {
        search_text: text.to_string(),
        ..QuerySpec::sorted_by(SortKey::Rank, SortOrder::Asc)
    };
    query::run(records, &spec)
        .records
        .iter()
        .take(panel_limits::SEARCH_HITS)
        .map(SearchHit::from)
        .collect()
}

/// Revalue holdings at snapshot prices. Symbols missing from the snapshot
/// are reported in `unpriced` and left out of every total.
pub fn value_portfolio(holdings: &[Holding], records: &[MarketRecord]) -> PortfolioSummary {
    let mut summary = PortfolioSummary::default();
    let mut total_cost = 0.0;

    for h in holdings {
        let Some(m) = records
            .iter()
            .find(|m| m.symbol.eq_ignore_ascii_case(&h.symbol))
        else {
            summary.unpriced.push(h.symbol.to_uppercase());
            continue;
        };

        let cost = h.quantity * h.average_buy_price;
        let total_value = h.quantity * m.price;
        let pnl = total_value - cost;

        total_cost += cost;
        summary.total_value += total_value;
        summary.total_pnl += pnl;
        summary.daily_change += h.quantity * m.change_24h;
        summary.holdings.push(PortfolioHolding {
            id: m.id.clone(),
            symbol: m.symbol.clone(),
            name: m.name.clone(),
            quantity: h.quantity,
            average_buy_price: h.average_buy_price,
            current_price: m.price,
            total_value,
            pnl,
            pnl_percent: percent(pnl, cost),
            image: m.image.clone(),
        });
    }

    summary.total_pnl_percent = percent(summary.total_pnl, total_cost);
    let value_day_ago = summary.total_value - summary.daily_change;
    summary.daily_change_percent = percent(summary.daily_change, value_day_ago);
    summary
}

fn alert_message(kind: AlertKind, name: &str, condition: f64) -> String {
    match kind {
        AlertKind::PriceAbove => format!("{name} price above ${condition}"),
        AlertKind::PriceBelow => format!("{name} price below ${condition}"),
        AlertKind::VolumeSpike => format!("{name} 24h volume above ${condition}"),
        AlertKind::PercentChange if condition < 0.0 => {
            format!("{name} dropped more than {}% in 24h", -condition)
        }
        AlertKind::PercentChange => format!("{name} rose more than {condition}% in 24h"),
    }
}

/// Evaluate alert rules against a snapshot taken at `as_of`. Rules on symbols
/// missing from the snapshot are skipped. Triggered alerts come first, then
/// newest rule first.
pub fn evaluate_alerts(
    rules: &[AlertRule],
    records: &[MarketRecord],
    as_of: DateTime<Utc>,
) -> Vec<MarketAlert> {
    let mut alerts: Vec<MarketAlert> = rules
        .iter()
        .filter_map(|rule| {
            let m = records
                .iter()
                .find(|m| m.symbol.eq_ignore_ascii_case(&rule.symbol))?;
            let (current_value, triggered) = match rule.kind {
                AlertKind::PriceAbove => (m.price, m.price > rule.condition),
                AlertKind::PriceBelow => (m.price, m.price < rule.condition),
                AlertKind::VolumeSpike => (m.volume_24h, m.volume_24h > rule.condition),
                AlertKind::PercentChange => {
                    let change = m.change_percent_24h;
                    let hit = if rule.condition < 0.0 {
                        change <= rule.condition
                    } else {
                        change >= rule.condition
                    };
                    (change, hit)
                }
            };
            Some(MarketAlert {
                id: rule.id.clone(),
                symbol: m.symbol.clone(),
                name: m.name.clone(),
                kind: rule.kind,
                condition: rule.condition,
                current_value,
                triggered,
                created_at: rule.created_at,
                triggered_at: triggered.then_some(as_of),
                message: alert_message(rule.kind, &m.name, rule.condition),
            })
        })
        .collect();

    alerts.sort_by(|a, b| {
        b.triggered
            .cmp(&a.triggered)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    alerts
}

/// Insights for one symbol (case-insensitive), or all of them.
pub fn insights_for(insights: &[AiInsight], symbol: Option<&str>) -> Vec<AiInsight> {
    match symbol.map(str::trim).filter(|s| !s.is_empty()) {
        Some(sym) => insights
            .iter()
            .filter(|i| i.symbol.eq_ignore_ascii_case(sym))
            .cloned()
            .collect(),
        None => insights.to_vec(),
    }
}
