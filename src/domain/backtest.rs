//! EMA crossover backtest engine.
//!
//! Walks a daily close series once with a Flat/Long state machine: go long when
//! the fast EMA is strictly above the slow EMA, go flat when it is strictly
//! below. The first bar only seeds the averages. An open position at the end of
//! the series stays open and is excluded from the summary.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use super::ema::calculate_ema;
use super::error::TraderError;
use super::ohlcv::PriceBar;
use super::symbols::SymbolList;
use crate::ports::market_data_port::MarketDataPort;

pub const DEFAULT_FAST_SPAN: usize = 21;
pub const DEFAULT_SLOW_SPAN: usize = 50;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 1460;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub fast_span: usize,
    pub slow_span: usize,
    pub lookback_days: u32,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            fast_span: DEFAULT_FAST_SPAN,
            slow_span: DEFAULT_SLOW_SPAN,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeEvent {
    #[serde(rename = "Type")]
    pub side: TradeSide,
    #[serde(rename = "Price")]
    pub price: f64,
    #[serde(rename = "Time", serialize_with = "serialize_date")]
    pub date: NaiveDate,
    #[serde(rename = "Profit", skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
}

fn serialize_date<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub net_profit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOutcome {
    pub trades: Vec<TradeEvent>,
    pub summary: BacktestSummary,
}

/// Backtest outcome labelled with its symbol, ready to hand back to a caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub summary: BacktestSummary,
    pub trades: Vec<TradeEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PositionState {
    Flat,
    Long { entry_price: f64 },
}

/// Round to two decimal places, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

pub fn run_backtest(
    symbol: &str,
    bars: &[PriceBar],
    config: &BacktestConfig,
) -> Result<BacktestOutcome, TraderError> {
    if bars.is_empty() {
        return Err(TraderError::NoData {
            symbol: symbol.to_string(),
        });
    }

    let closes = bars
        .iter()
        .map(PriceBar::checked_close)
        .collect::<Result<Vec<f64>, _>>()?;

    let fast = calculate_ema(&closes, config.fast_span);
    let slow = calculate_ema(&closes, config.slow_span);
    if fast.len() != closes.len() || slow.len() != closes.len() {
        return Err(TraderError::Computation {
            reason: format!(
                "EMA spans must be positive (fast {}, slow {})",
                config.fast_span, config.slow_span
            ),
        });
    }

    let mut trades = Vec::new();
    let mut summary = BacktestSummary::default();
    let mut state = PositionState::Flat;
    let mut net_profit = 0.0;

    for i in 1..bars.len() {
        let close = closes[i];
        match state {
            PositionState::Flat if fast[i] > slow[i] => {
                trades.push(TradeEvent {
                    side: TradeSide::Buy,
                    price: close,
                    date: bars[i].date(),
                    profit: None,
                });
                state = PositionState::Long { entry_price: close };
            }
            PositionState::Long { entry_price } if fast[i] < slow[i] => {
                let profit = round2(close - entry_price);
                trades.push(TradeEvent {
                    side: TradeSide::Sell,
                    price: close,
                    date: bars[i].date(),
                    profit: Some(profit),
                });
                if profit > 0.0 {
                    summary.winning_trades += 1;
                } else {
                    summary.losing_trades += 1;
                }
                net_profit += profit;
                state = PositionState::Flat;
            }
            _ => {}
        }
    }

    if let PositionState::Long { entry_price } = state {
        debug!(symbol, entry_price, "series ended with an open position");
    }

    summary.total_trades = summary.winning_trades + summary.losing_trades;
    summary.net_profit = round2(net_profit);

    Ok(BacktestOutcome { trades, summary })
}

/// Fetch the daily series for an allow-listed symbol and backtest it.
pub fn backtest_symbol(
    market: &dyn MarketDataPort,
    symbols: &SymbolList,
    symbol: Option<&str>,
    config: &BacktestConfig,
) -> Result<BacktestReport, TraderError> {
    let symbol = symbols.validate(symbol)?;
    let ticker = symbols.ticker(symbol);

    let bars = market.fetch_daily_series(&ticker, config.lookback_days)?;
    let outcome = run_backtest(symbol, &bars, config)?;

    info!(
        symbol,
        bars = bars.len(),
        trades = outcome.trades.len(),
        net_profit = outcome.summary.net_profit,
        "backtest complete"
    );

    Ok(BacktestReport {
        symbol: symbol.to_string(),
        summary: outcome.summary,
        trades: outcome.trades,
    })
}
