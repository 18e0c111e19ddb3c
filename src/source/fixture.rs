use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::SourceError;
use crate::source::MarketSource;
use crate::types::{
    AiInsight, AlertKind, AlertRule, Category, ChartPoint, Holding, InsightKind, MarketDetail,
    MarketRecord, Timeframe,
};

/// Static market data for demos and offline development.
/// `last_updated` is stamped at fetch time.
pub struct FixtureSource {
    markets: Vec<MarketRecord>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::with_markets(demo_markets())
    }

    pub fn with_markets(markets: Vec<MarketRecord>) -> Self {
        Self { markets }
    }

    fn find(&self, symbol: &str) -> Result<&MarketRecord, SourceError> {
        self.markets
            .iter()
            .find(|m| m.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| SourceError::NotFound(symbol.to_uppercase()))
    }
}

impl Default for FixtureSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketSource for FixtureSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch_markets(&self) -> Result<Vec<MarketRecord>, SourceError> {
        let now = Utc::now();
        Ok(self
            .markets
            .iter()
            .cloned()
            .map(|mut m| {
                m.last_updated = now;
                m
            })
            .collect())
    }

    async fn fetch_detail(&self, symbol: &str) -> Result<MarketDetail, SourceError> {
        let mut market = self.find(symbol)?.clone();
        market.last_updated = Utc::now();
        Ok(detail_for(market))
    }

    async fn fetch_chart(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<ChartPoint>, SourceError> {
        let market = self.find(symbol)?;
        Ok(synthetic_chart(market, timeframe, Utc::now().timestamp_millis()))
    }
}

/// Deterministic price path oscillating ±2% around the current price.
/// Hourly points, or 5-minute points for the 1h window.
pub fn synthetic_chart(market: &MarketRecord, timeframe: Timeframe, end_ms: i64) -> Vec<ChartPoint> {
    let span_ms = timeframe.duration().num_milliseconds();
    let step_ms: i64 = match timeframe {
        Timeframe::OneHour => 5 * 60 * 1000,
        _ => 60 * 60 * 1000,
    };
    let steps = span_ms / step_ms;
    let hourly_volume = market.volume_24h / 24.0;

    (0..=steps)
        .map(|i| {
            let phase = i as f64 * 0.5;
            ChartPoint {
                timestamp: end_ms - (steps - i) * step_ms,
                price: market.price * (1.0 + 0.02 * phase.sin()),
                volume: hourly_volume * (1.0 + 0.1 * phase.cos()),
            }
        })
        .collect()
}

fn detail_for(market: MarketRecord) -> MarketDetail {
    if market.symbol == "BTC" {
        return MarketDetail {
            description: Some(
                "Bitcoin is a decentralized digital currency that can be transferred on the \
                 peer-to-peer bitcoin network."
                    .to_string(),
            ),
            website: Some("https://bitcoin.org".to_string()),
            total_supply: Some(21_000_000.0),
            circulating_supply: Some(19_500_000.0),
            high_24h: 43850.20,
            low_24h: 41950.45,
            price_change_7d: 2850.75,
            price_change_percent_7d: 7.05,
            price_change_30d: -1250.30,
            price_change_percent_30d: -2.81,
            all_time_high: 69045.22,
            all_time_high_date: Utc.with_ymd_and_hms(2021, 11, 10, 14, 24, 11).single().unwrap_or_default(),
            all_time_low: 67.81,
            all_time_low_date: Utc.with_ymd_and_hms(2013, 7, 6, 0, 0, 0).single().unwrap_or_default(),
            market,
        };
    }

    // Fixture has no history for the rest: report the current price as the range.
    let price = market.price;
    let now = market.last_updated;
    MarketDetail {
        description: None,
        website: None,
        total_supply: None,
        circulating_supply: None,
        high_24h: price.max(price - market.change_24h),
        low_24h: price.min(price - market.change_24h),
        price_change_7d: 0.0,
        price_change_percent_7d: 0.0,
        price_change_30d: 0.0,
        price_change_percent_30d: 0.0,
        all_time_high: price,
        all_time_high_date: now,
        all_time_low: price,
        all_time_low_date: now,
        market,
    }
}

pub fn demo_markets() -> Vec<MarketRecord> {
    let at = Utc::now();
    let m = |id: &str,
             symbol: &str,
             name: &str,
             price: f64,
             change_24h: f64,
             change_percent_24h: f64,
             volume_24h: f64,
             market_cap: f64,
             rank: u32,
             image: Option<&str>| MarketRecord {
        id: id.to_string(),
        symbol: symbol.to_string(),
        name: name.to_string(),
        price,
        change_24h,
        change_percent_24h,
        volume_24h,
        market_cap,
        rank,
        category: Category::Cryptocurrency,
        image: image.map(str::to_string),
        last_updated: at,
    };

    vec![
        m("1", "BTC", "Bitcoin", 43250.75, 1250.30, 2.98, 28.5e9, 845e9, 1,
          Some("https://assets.coingecko.com/coins/images/1/large/bitcoin.png")),
        m("2", "ETH", "Ethereum", 2650.45, -85.20, -3.11, 15.2e9, 318e9, 2,
          Some("https://assets.coingecko.com/coins/images/279/large/ethereum.png")),
        m("3", "SOL", "Solana", 98.76, 4.32, 4.57, 2.1e9, 45e9, 3, None),
        m("4", "ADA", "Cardano", 0.485, 0.023, 4.98, 450e6, 17e9, 4, None),
        m("5", "AVAX", "Avalanche", 36.75, -1.24, -3.26, 680e6, 14.5e9, 5, None),
    ]
}

pub fn demo_holdings() -> Vec<Holding> {
    vec![
        Holding {
            symbol: "BTC".to_string(),
            quantity: 2.5,
            average_buy_price: 38500.0,
        },
        Holding {
            symbol: "ETH".to_string(),
            quantity: 6.5,
            average_buy_price: 2400.0,
        },
    ]
}

fn jan_15_2024(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, hour, min, 0)
        .single()
        .unwrap_or_default()
}

pub fn demo_alert_rules() -> Vec<AlertRule> {
    let rule = |id: &str, symbol: &str, kind, condition, created_at| AlertRule {
        id: id.to_string(),
        symbol: symbol.to_string(),
        kind,
        condition,
        created_at,
    };
    vec![
        rule("1", "BTC", AlertKind::PriceAbove, 43000.0, jan_15_2024(10, 30)),
        rule("2", "ETH", AlertKind::PercentChange, -3.0, jan_15_2024(9, 0)),
        rule("3", "SOL", AlertKind::VolumeSpike, 5e9, jan_15_2024(8, 15)),
        rule("4", "ADA", AlertKind::PriceBelow, 0.40, jan_15_2024(7, 45)),
    ]
}

pub fn demo_insights() -> Vec<AiInsight> {
    let reasons = |r: &[&str]| r.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    vec![
        AiInsight {
            id: "1".to_string(),
            symbol: "BTC".to_string(),
            kind: InsightKind::Bullish,
            confidence: 0.78,
            title: "Strong Institutional Buying Pressure".to_string(),
            description: "Analysis indicates significant institutional accumulation patterns in Bitcoin"
                .to_string(),
            reasoning: reasons(&[
                "Large wallet addresses showing increased activity",
                "Reduced exchange reserves indicate holding behavior",
                "Options flow suggests bullish sentiment",
            ]),
            created_at: jan_15_2024(12, 0),
            timeframe: "7d".to_string(),
        },
        AiInsight {
            id: "2".to_string(),
            symbol: "ETH".to_string(),
            kind: InsightKind::Bearish,
            confidence: 0.65,
            title: "Network Congestion Concerns".to_string(),
            description: "High gas fees and network congestion may impact short-term price action"
                .to_string(),
            reasoning: reasons(&[
                "Gas fees at 6-month highs",
                "DeFi activity showing signs of migration",
                "Technical indicators suggest potential correction",
            ]),
            created_at: jan_15_2024(11, 30),
            timeframe: "1d".to_string(),
        },
    ]
}
