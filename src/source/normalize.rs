//! Boundary normalization of upstream JSON into snapshot records.
//!
//! Everything the query pipeline assumes about a record (finite numbers,
//! unique symbols and ranks, uppercase tickers) is established here.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::SourceError;
use crate::types::{Category, ChartPoint, MarketDetail, MarketRecord};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizeStats {
    pub api_total: usize,
    pub accepted: usize,
    pub rejected_missing_field: usize,
    pub rejected_bad_number: usize,
    pub rejected_bad_rank: usize,
    pub rejected_duplicate_symbol: usize,
    pub rejected_duplicate_rank: usize,
}

impl NormalizeStats {
    pub fn rejected(&self) -> usize {
        self.rejected_missing_field
            + self.rejected_bad_number
            + self.rejected_bad_rank
            + self.rejected_duplicate_symbol
            + self.rejected_duplicate_rank
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingField(&'static str),
    BadNumber(&'static str),
    BadRank,
}

/// Normalize a `/markets` payload. Duplicate symbols or ranks keep the first
/// occurrence. A payload that is not an array is malformed.
pub fn normalize_markets(
    payload: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<(Vec<MarketRecord>, NormalizeStats), SourceError> {
    let items = payload
        .as_array()
        .ok_or_else(|| SourceError::Malformed("/markets response was not an array".to_string()))?;

    let mut stats = NormalizeStats {
        api_total: items.len(),
        ..NormalizeStats::default()
    };
    let mut seen_symbols = HashSet::new();
    let mut seen_ranks = HashSet::new();
    let mut records = Vec::with_capacity(items.len());

    for item in items {
        match parse_market_record(item, fetched_at) {
            Ok(record) => {
                if !seen_symbols.insert(record.symbol.clone()) {
                    stats.rejected_duplicate_symbol += 1;
                    continue;
                }
                if !seen_ranks.insert(record.rank) {
                    stats.rejected_duplicate_rank += 1;
                    continue;
                }
                records.push(record);
            }
            Err(rejection) => {
                debug!(?rejection, symbol = ?item.get("symbol"), "market record rejected");
                match rejection {
                    Rejection::MissingField(_) => stats.rejected_missing_field += 1,
                    Rejection::BadNumber(_) => stats.rejected_bad_number += 1,
                    Rejection::BadRank => stats.rejected_bad_rank += 1,
                }
            }
        }
    }

    stats.accepted = records.len();
    Ok((records, stats))
}

/// Parse one market object. Numbers may arrive as JSON numbers or numeric strings.
pub fn parse_market_record(v: &Value, fetched_at: DateTime<Utc>) -> Result<MarketRecord, Rejection> {
    let symbol = non_empty_str(v, "symbol")
        .ok_or(Rejection::MissingField("symbol"))?
        .to_uppercase();
    let id = match v.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(Rejection::MissingField("id")),
    };
    let name = non_empty_str(v, "name")
        .map(str::to_string)
        .unwrap_or_else(|| symbol.clone());

    let price = non_negative(v, "price")?;
    let change_24h = finite(v, "change24h")?.unwrap_or(0.0);
    let change_percent_24h = finite(v, "changePercent24h")?.unwrap_or(0.0);
    let volume_24h = non_negative(v, "volume24h")?;
    let market_cap = non_negative(v, "marketCap")?;

    let rank = finite(v, "rank")?.ok_or(Rejection::MissingField("rank"))?;
    if rank < 1.0 || rank.fract() != 0.0 || rank > f64::from(u32::MAX) {
        return Err(Rejection::BadRank);
    }

    let category = v
        .get("category")
        .and_then(Value::as_str)
        .map(Category::from_tag)
        .unwrap_or(Category::Other);

    let image = non_empty_str(v, "image").map(str::to_string);
    let last_updated = timestamp(v, "lastUpdated").unwrap_or(fetched_at);

    Ok(MarketRecord {
        id,
        symbol,
        name,
        price,
        change_24h,
        change_percent_24h,
        volume_24h,
        market_cap,
        rank: rank as u32,
        category,
        image,
        last_updated,
    })
}

/// Parse a `/markets/{symbol}/details` object.
pub fn parse_detail(v: &Value, fetched_at: DateTime<Utc>) -> Result<MarketDetail, SourceError> {
    let market = parse_market_record(v, fetched_at)
        .map_err(|r| SourceError::Malformed(format!("detail record rejected: {r:?}")))?;
    let num = |key: &'static str| -> Result<f64, SourceError> {
        finite(v, key)
            .map_err(|_| SourceError::Malformed(format!("detail field `{key}` is not finite")))
            .map(|n| n.unwrap_or(0.0))
    };

    Ok(MarketDetail {
        description: non_empty_str(v, "description").map(str::to_string),
        website: non_empty_str(v, "website").map(str::to_string),
        total_supply: finite(v, "totalSupply").ok().flatten(),
        circulating_supply: finite(v, "circulatingSupply").ok().flatten(),
        high_24h: num("high24h")?,
        low_24h: num("low24h")?,
        price_change_7d: num("priceChange7d")?,
        price_change_percent_7d: num("priceChangePercent7d")?,
        price_change_30d: num("priceChange30d")?,
        price_change_percent_30d: num("priceChangePercent30d")?,
        all_time_high: num("allTimeHigh")?,
        all_time_high_date: timestamp(v, "allTimeHighDate").unwrap_or(fetched_at),
        all_time_low: num("allTimeLow")?,
        all_time_low_date: timestamp(v, "allTimeLowDate").unwrap_or(fetched_at),
        market,
    })
}

/// Parse a chart payload, dropping points with non-finite values, ordered by time.
pub fn parse_chart(payload: &Value) -> Result<Vec<ChartPoint>, SourceError> {
    let items = payload
        .as_array()
        .ok_or_else(|| SourceError::Malformed("chart response was not an array".to_string()))?;

    let mut points: Vec<ChartPoint> = items
        .iter()
        .filter_map(|p| {
            let timestamp = finite(p, "timestamp").ok()??;
            let price = finite(p, "price").ok()??;
            let volume = finite(p, "volume").ok().flatten().unwrap_or(0.0);
            Some(ChartPoint {
                timestamp: timestamp as i64,
                price,
                volume,
            })
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);
    Ok(points)
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn non_empty_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `Ok(None)` if absent or null, `Err` if present but not a finite number.
fn finite(v: &Value, key: &'static str) -> Result<Option<f64>, Rejection> {
    let raw = match v.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(x) => x,
    };
    let n = raw
        .as_f64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .ok_or(Rejection::BadNumber(key))?;
    if n.is_finite() {
        Ok(Some(n))
    } else {
        Err(Rejection::BadNumber(key))
    }
}

fn non_negative(v: &Value, key: &'static str) -> Result<f64, Rejection> {
    match finite(v, key)? {
        Some(n) if n >= 0.0 => Ok(n),
        Some(_) => Err(Rejection::BadNumber(key)),
        None => Err(Rejection::MissingField(key)),
    }
}

fn timestamp(v: &Value, key: &str) -> Option<DateTime<Utc>> {
    let s = non_empty_str(v, key)?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
