//! Market sources: where snapshots, detail records and charts come from.
//!
//! The concrete source is picked once at startup from [`Config`]; callers only
//! ever see `Arc<dyn MarketSource>`.

pub mod fixture;
pub mod http;
pub mod normalize;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, SourceKind};
use crate::error::{Result, SourceError};
use crate::types::{ChartPoint, MarketDetail, MarketRecord, Timeframe};

pub use fixture::FixtureSource;
pub use http::HttpSource;

#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Short label used in logs and `/health`.
    fn name(&self) -> &'static str;

    /// One complete, normalized snapshot.
    async fn fetch_markets(&self) -> std::result::Result<Vec<MarketRecord>, SourceError>;

    async fn fetch_detail(&self, symbol: &str) -> std::result::Result<MarketDetail, SourceError>;

    async fn fetch_chart(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> std::result::Result<Vec<ChartPoint>, SourceError>;
}

pub fn from_config(cfg: &Config) -> Result<Arc<dyn MarketSource>> {
    let source: Arc<dyn MarketSource> = match cfg.source {
        SourceKind::Fixture => Arc::new(FixtureSource::new()),
        SourceKind::Http => Arc::new(HttpSource::new(&cfg.markets_api_url)?),
    };
    Ok(source)
}
