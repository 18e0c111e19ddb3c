use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MarketRecord
// ---------------------------------------------------------------------------

/// One tradable asset at a point in time. Immutable once it is part of a
/// published snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRecord {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub price: f64,
    /// Absolute 24h price delta in USD.
    pub change_24h: f64,
    /// 24h price delta as a percentage.
    pub change_percent_24h: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    /// 1 = largest market cap.
    pub rank: u32,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cryptocurrency,
    Defi,
    Nft,
    Gaming,
    Metaverse,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Cryptocurrency,
        Category::Defi,
        Category::Nft,
        Category::Gaming,
        Category::Metaverse,
        Category::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Cryptocurrency => "cryptocurrency",
            Category::Defi => "defi",
            Category::Nft => "nft",
            Category::Gaming => "gaming",
            Category::Metaverse => "metaverse",
            Category::Other => "other",
        }
    }

    /// Lenient parse for upstream payloads: unknown tags collapse to `Other`.
    pub fn from_tag(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "cryptocurrency" | "crypto" => Category::Cryptocurrency,
            "defi" => Category::Defi,
            "nft" => Category::Nft,
            "gaming" => Category::Gaming,
            "metaverse" => Category::Metaverse,
            _ => Category::Other,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Detail / chart
// ---------------------------------------------------------------------------

/// Extended per-asset data shown on the detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDetail {
    #[serde(flatten)]
    pub market: MarketRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circulating_supply: Option<f64>,
    pub high_24h: f64,
    pub low_24h: f64,
    pub price_change_7d: f64,
    pub price_change_percent_7d: f64,
    pub price_change_30d: f64,
    pub price_change_percent_30d: f64,
    pub all_time_high: f64,
    pub all_time_high_date: DateTime<Utc>,
    pub all_time_low: f64,
    pub all_time_low_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub price: f64,
    pub volume: f64,
}

/// Chart window requested by the detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[default]
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl Timeframe {
    pub const fn as_str(self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::OneDay => "24h",
            Timeframe::SevenDays => "7d",
            Timeframe::ThirtyDays => "30d",
        }
    }

    pub fn duration(self) -> chrono::Duration {
        match self {
            Timeframe::OneHour => chrono::Duration::hours(1),
            Timeframe::OneDay => chrono::Duration::hours(24),
            Timeframe::SevenDays => chrono::Duration::days(7),
            Timeframe::ThirtyDays => chrono::Duration::days(30),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = crate::error::QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Timeframe::OneHour),
            "24h" | "1d" => Ok(Timeframe::OneDay),
            "7d" => Ok(Timeframe::SevenDays),
            "30d" => Ok(Timeframe::ThirtyDays),
            other => Err(crate::error::QueryError::InvalidTimeframe(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard panels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub total_market_cap: f64,
    pub total_volume: f64,
    pub btc_dominance: f64,
    pub eth_dominance: f64,
    /// Market-cap weighted 24h percent change.
    pub market_cap_change_24h: f64,
    pub active_markets: usize,
    pub gainers: usize,
    pub losers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingMarket {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change_percent_24h: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub rank: u32,
    pub price: f64,
}

impl From<&MarketRecord> for TrendingMarket {
    fn from(m: &MarketRecord) -> Self {
        Self {
            id: m.id.clone(),
            symbol: m.symbol.clone(),
            name: m.name.clone(),
            price: m.price,
            change_percent_24h: m.change_percent_24h,
            image: m.image.clone(),
            rank: m.rank,
        }
    }
}

impl From<&MarketRecord> for SearchHit {
    fn from(m: &MarketRecord) -> Self {
        Self {
            id: m.id.clone(),
            symbol: m.symbol.clone(),
            name: m.name.clone(),
            image: m.image.clone(),
            rank: m.rank,
            price: m.price,
        }
    }
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
    pub average_buy_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioHolding {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub quantity: f64,
    pub average_buy_price: f64,
    pub current_price: f64,
    pub total_value: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_pnl: f64,
    pub total_pnl_percent: f64,
    pub daily_change: f64,
    pub daily_change_percent: f64,
    pub holdings: Vec<PortfolioHolding>,
    /// Holdings whose symbol is absent from the current snapshot.
    pub unpriced: Vec<String>,
}

// ---------------------------------------------------------------------------
// Alerts and insights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceAbove,
    PriceBelow,
    VolumeSpike,
    /// Fires at or beyond `condition` percent, in the direction of its sign.
    PercentChange,
}

/// A watch condition on one symbol, evaluated against each snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub symbol: String,
    pub kind: AlertKind,
    pub condition: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAlert {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub condition: f64,
    pub current_value: f64,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInsight {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: InsightKind,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub title: String,
    pub description: String,
    pub reasoning: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub timeframe: String,
}
