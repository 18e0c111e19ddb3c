use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::SourceError;
use crate::source::normalize::{normalize_markets, parse_chart, parse_detail};
use crate::source::MarketSource;
use crate::types::{ChartPoint, MarketDetail, MarketRecord, Timeframe};

/// Market source backed by a remote REST API.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, SourceError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl MarketSource for HttpSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_markets(&self) -> Result<Vec<MarketRecord>, SourceError> {
        let url = format!("{}/markets", self.base_url);
        let payload = self.get_json(&url).await?;
        let (records, stats) = normalize_markets(&payload, Utc::now())?;

        if stats.rejected() > 0 {
            warn!(
                missing_field = stats.rejected_missing_field,
                bad_number = stats.rejected_bad_number,
                bad_rank = stats.rejected_bad_rank,
                duplicate_symbol = stats.rejected_duplicate_symbol,
                duplicate_rank = stats.rejected_duplicate_rank,
                "[NORMALIZE] rejected {} of {} upstream records",
                stats.rejected(),
                stats.api_total,
            );
        }
        info!(accepted = stats.accepted, total = stats.api_total, "Fetched markets from {url}");
        Ok(records)
    }

    async fn fetch_detail(&self, symbol: &str) -> Result<MarketDetail, SourceError> {
        let url = format!("{}/markets/{}/details", self.base_url, symbol.to_uppercase());
        match self.get_json(&url).await {
            Ok(payload) => parse_detail(&payload, Utc::now()),
            Err(SourceError::Status(404)) => Err(SourceError::NotFound(symbol.to_uppercase())),
            Err(e) => Err(e),
        }
    }

    async fn fetch_chart(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<ChartPoint>, SourceError> {
        let url = format!(
            "{}/markets/{}/chart?timeframe={}",
            self.base_url,
            symbol.to_uppercase(),
            timeframe
        );
        match self.get_json(&url).await {
            Ok(payload) => parse_chart(&payload),
            Err(SourceError::Status(404)) => Err(SourceError::NotFound(symbol.to_uppercase())),
            Err(e) => Err(e),
        }
    }
}
