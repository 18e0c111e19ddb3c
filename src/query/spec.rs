use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::types::MarketRecord;

/// Field a market list can be ordered by.
///
/// Each variant maps to exactly one accessor, so an unknown field can only
/// show up while parsing a string and never inside the comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    #[serde(rename = "rank")]
    Rank,
    #[serde(rename = "price")]
    Price,
    #[serde(rename = "change24h")]
    Change24h,
    #[serde(rename = "volume24h")]
    Volume24h,
    #[serde(rename = "marketCap")]
    MarketCap,
}

impl SortKey {
    pub const ALL: [SortKey; 5] = [
        SortKey::Rank,
        SortKey::Price,
        SortKey::Change24h,
        SortKey::Volume24h,
        SortKey::MarketCap,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SortKey::Rank => "rank",
            SortKey::Price => "price",
            SortKey::Change24h => "change24h",
            SortKey::Volume24h => "volume24h",
            SortKey::MarketCap => "marketCap",
        }
    }

    /// The numeric value this key orders by. `rank` is widened losslessly.
    pub fn value(self, record: &MarketRecord) -> f64 {
        match self {
            SortKey::Rank => f64::from(record.rank),
            SortKey::Price => record.price,
            SortKey::Change24h => record.change_24h,
            SortKey::Volume24h => record.volume_24h,
            SortKey::MarketCap => record.market_cap,
        }
    }

    /// Next key in display order, wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortKey {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rank" => Ok(SortKey::Rank),
            "price" => Ok(SortKey::Price),
            "change24h" | "change_24h" => Ok(SortKey::Change24h),
            "volume24h" | "volume_24h" => Ok(SortKey::Volume24h),
            "marketCap" | "market_cap" => Ok(SortKey::MarketCap),
            other => Err(QueryError::InvalidSortKey(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub const fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub const fn reversed(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(QueryError::InvalidSortOrder(other.to_string())),
        }
    }
}

/// User-declared view constraints over a snapshot.
///
/// Bounds are independent and optional. Nothing here checks `min <= max`:
/// a contradictory pair simply filters everything out.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_volume: Option<f64>,
    pub max_volume: Option<f64>,
    pub min_market_cap: Option<f64>,
    pub max_market_cap: Option<f64>,
    #[serde(default)]
    pub sort_by: SortKey,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub search_text: String,
}

impl QuerySpec {
    pub fn sorted_by(sort_by: SortKey, sort_order: SortOrder) -> Self {
        Self {
            sort_by,
            sort_order,
            ..Self::default()
        }
    }

    /// Number of filter constraints in effect, excluding sort and search.
    pub fn active_filter_count(&self) -> usize {
        [
            self.category.is_some(),
            self.min_price.is_some(),
            self.max_price.is_some(),
            self.min_volume.is_some(),
            self.max_volume.is_some(),
            self.min_market_cap.is_some(),
            self.max_market_cap.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Drops every filter and the search text; keeps the sort.
    pub fn clear_filters(&mut self) {
        *self = Self::sorted_by(self.sort_by, self.sort_order);
    }
}

/// Untyped query parameters as they arrive over HTTP.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_volume: Option<f64>,
    pub max_volume: Option<f64>,
    pub min_market_cap: Option<f64>,
    pub max_market_cap: Option<f64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    #[serde(alias = "q", alias = "searchText")]
    pub search: Option<String>,
}

impl TryFrom<QueryParams> for QuerySpec {
    type Error = QueryError;

    fn try_from(p: QueryParams) -> Result<Self, Self::Error> {
        let sort_by = match p.sort_by.as_deref() {
            None | Some("") => SortKey::default(),
            Some(s) => s.parse()?,
        };
        let sort_order = match p.sort_order.as_deref() {
            None | Some("") => SortOrder::default(),
            Some(s) => s.parse()?,
        };

        Ok(Self {
            category: p.category.filter(|c| !c.is_empty()),
            min_price: p.min_price,
            max_price: p.max_price,
            min_volume: p.min_volume,
            max_volume: p.max_volume,
            min_market_cap: p.min_market_cap,
            max_market_cap: p.max_market_cap,
            sort_by,
            sort_order,
            search_text: p.search.unwrap_or_default(),
        })
    }
}
