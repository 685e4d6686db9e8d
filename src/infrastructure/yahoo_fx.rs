//! FX rate client (Yahoo Finance chart API)
//!
//! Fetches the latest `{CUR}JPY=X` quote. One request per currency per
//! run: the currency converter memoizes on top of this client, and rows
//! already in yen never reach it.

use crate::domain::errors::RateError;
use crate::domain::repositories::rate_source::RateSource;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const CHART_API_BASE: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// The chart endpoint rejects requests without a browser-like user agent.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Quote currency of every pair this client resolves.
const QUOTE_CURRENCY: &str = "JPY";

#[derive(Debug, Clone)]
pub struct YahooFxConfig {
    pub base_url: String,
}

impl Default for YahooFxConfig {
    fn default() -> Self {
        Self {
            base_url: CHART_API_BASE.to_string(),
        }
    }
}

/// Rate source backed by Yahoo Finance FX tickers.
#[derive(Debug)]
pub struct YahooFxClient {
    client: Client,
    config: YahooFxConfig,
}

impl YahooFxClient {
    pub fn new() -> Result<Self, RateError> {
        Self::with_config(YahooFxConfig::default())
    }

    pub fn with_config(config: YahooFxConfig) -> Result<Self, RateError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RateError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl RateSource for YahooFxClient {
    async fn latest_rate(&self, from_currency: &str) -> Result<f64, RateError> {
        let pair = format!("{}{}=X", from_currency, QUOTE_CURRENCY);
        let url = format!("{}/{}", self.config.base_url, pair);
        let response: ChartResponse = self
            .client
            .get(&url)
            .query(&[("range", "1d"), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| RateError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| RateError::Parse(e.to_string()))?;

        let rate = response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .and_then(|result| result.meta.regular_market_price)
            .ok_or_else(|| RateError::Unavailable { pair: pair.clone() })?;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(RateError::Unavailable { pair });
        }
        Ok(rate)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}
