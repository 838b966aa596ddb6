//! Price bar representation and the live chart view.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Serialize;

use super::error::TraderError;
use super::position::to_money;
use super::symbols::SymbolList;
use crate::ports::market_data_port::MarketDataPort;

/// One sample of a price series, as delivered by a market data provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Close price, rejected when the provider handed over NaN or infinity.
    pub fn checked_close(&self) -> Result<f64, TraderError> {
        if self.close.is_finite() {
            Ok(self.close)
        } else {
            Err(TraderError::Computation {
                reason: format!("non-numeric close price at {}", self.timestamp),
            })
        }
    }
}

/// Convert a provider price into a cent-precision money amount.
pub fn price_to_money(value: f64) -> Result<Decimal, TraderError> {
    if !value.is_finite() {
        return Err(TraderError::provider(format!("non-numeric price {value}")));
    }
    Decimal::from_f64(value)
        .map(to_money)
        .ok_or_else(|| TraderError::provider(format!("price {value} out of range")))
}

/// Intraday series for one symbol, keyed the way the chart front-end reads it.
#[derive(Debug, Clone, Serialize)]
pub struct LiveChart {
    pub symbol: String,
    pub data: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartPoint {
    #[serde(rename = "Datetime")]
    pub datetime: String,
    #[serde(rename = "Open")]
    pub open: f64,
    #[serde(rename = "High")]
    pub high: f64,
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Close")]
    pub close: f64,
}

impl LiveChart {
    pub fn from_bars(symbol: &str, bars: &[PriceBar]) -> Result<Self, TraderError> {
        if bars.is_empty() {
            return Err(TraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        let data = bars
            .iter()
            .map(|bar| ChartPoint {
                datetime: bar.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            })
            .collect();
        Ok(LiveChart {
            symbol: symbol.to_string(),
            data,
        })
    }
}

/// Today's intraday chart for an allowed symbol.
pub fn load_live_chart(
    market: &dyn MarketDataPort,
    symbols: &SymbolList,
    symbol: Option<&str>,
) -> Result<LiveChart, TraderError> {
    let symbol = symbols.validate(symbol)?;
    let bars = market.fetch_intraday_series(&symbols.ticker(symbol))?;
    LiveChart::from_bars(symbol, &bars)
}
