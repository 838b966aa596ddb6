//! Yahoo Finance chart API adapter.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::{PriceBar, price_to_money};
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration as StdDuration;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_TIMEOUT_SECS: i64 = 10;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; papertrader)";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

pub struct YahooAdapter {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl YahooAdapter {
    pub fn new(base_url: &str, timeout: StdDuration) -> Result<Self, TraderError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TraderError::provider(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let base_url = config
            .get_string("market_data", "base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout = config.get_int("market_data", "timeout_secs", DEFAULT_TIMEOUT_SECS);
        let timeout = u64::try_from(timeout)
            .ok()
            .filter(|secs| *secs >= 1)
            .ok_or_else(|| TraderError::ConfigInvalid {
                section: "market_data".into(),
                key: "timeout_secs".into(),
                reason: "timeout_secs must be at least 1".into(),
            })?;
        Self::new(base_url.trim(), StdDuration::from_secs(timeout))
    }

    fn fetch_chart(&self, ticker: &str, query: &str) -> Result<ChartResult, TraderError> {
        let url = format!("{}/v8/finance/chart/{}?{}", self.base_url, ticker, query);
        tracing::debug!(%url, "requesting chart");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| TraderError::provider(format!("request for {} failed: {}", ticker, e)))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| TraderError::provider(format!("failed to read response: {}", e)))?;

        match serde_json::from_str::<ChartResponse>(&body) {
            Ok(parsed) => first_result(ticker, parsed),
            Err(_) if !status.is_success() => Err(TraderError::provider(format!(
                "chart request for {} returned HTTP {}",
                ticker, status
            ))),
            Err(e) => Err(TraderError::provider(format!(
                "unexpected chart response for {}: {}",
                ticker, e
            ))),
        }
    }
}

fn first_result(ticker: &str, response: ChartResponse) -> Result<ChartResult, TraderError> {
    if let Some(error) = response.chart.error {
        if error.code.eq_ignore_ascii_case("Not Found") {
            return Err(TraderError::NoData {
                symbol: ticker.to_string(),
            });
        }
        return Err(TraderError::provider(format!(
            "Yahoo API error: {} - {}",
            error.code, error.description
        )));
    }
    response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| TraderError::NoData {
            symbol: ticker.to_string(),
        })
}

/// Bars in exchange-local time. Rows with any missing price are skipped.
fn bars_from_result(result: &ChartResult) -> Vec<PriceBar> {
    let empty = QuoteSeries::default();
    let quote = result.indicators.quote.first().unwrap_or(&empty);
    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let timestamp = local_time(ts, result.meta.gmtoffset)?;
            Some(PriceBar {
                timestamp,
                open: at(&quote.open, i)?,
                high: at(&quote.high, i)?,
                low: at(&quote.low, i)?,
                close: at(&quote.close, i)?,
            })
        })
        .collect()
}

fn local_time(ts: i64, gmtoffset: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(ts.checked_add(gmtoffset)?, 0).map(|dt| dt.naive_utc())
}

fn latest_close(result: &ChartResult) -> Option<f64> {
    result
        .indicators
        .quote
        .first()
        .and_then(|q| q.close.iter().rev().find_map(|c| *c))
        .or(result.meta.regular_market_price)
}

impl MarketDataPort for YahooAdapter {
    fn fetch_daily_series(
        &self,
        ticker: &str,
        lookback_days: u32,
    ) -> Result<Vec<PriceBar>, TraderError> {
        let end = Utc::now();
        let start = end - Duration::days(i64::from(lookback_days));
        let query = format!(
            "period1={}&period2={}&interval=1d",
            start.timestamp(),
            end.timestamp()
        );
        let bars = bars_from_result(&self.fetch_chart(ticker, &query)?);
        tracing::debug!(ticker, bars = bars.len(), "fetched daily series");
        Ok(bars)
    }

    fn fetch_intraday_series(&self, ticker: &str) -> Result<Vec<PriceBar>, TraderError> {
        let bars = bars_from_result(&self.fetch_chart(ticker, "range=1d&interval=15m")?);
        tracing::debug!(ticker, bars = bars.len(), "fetched intraday series");
        Ok(bars)
    }

    fn fetch_latest_quote(&self, ticker: &str) -> Result<Decimal, TraderError> {
        let result = self.fetch_chart(ticker, "range=1d&interval=1d")?;
        let close = latest_close(&result).ok_or_else(|| TraderError::NoData {
            symbol: ticker.to_string(),
        })?;
        price_to_money(close)
    }
}
