#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use papertrader::adapters::sqlite_adapter::SqliteAdapter;
use papertrader::domain::error::TraderError;
pub use papertrader::domain::ohlcv::PriceBar;
use papertrader::domain::symbols::SymbolList;
use papertrader::ports::market_data_port::MarketDataPort;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory market data keyed by full ticker (e.g. `TCS.NS`).
pub struct MockMarketData {
    pub daily: HashMap<String, Vec<PriceBar>>,
    pub intraday: HashMap<String, Vec<PriceBar>>,
    pub quotes: Mutex<HashMap<String, Decimal>>,
    pub errors: HashMap<String, String>,
    pub quote_calls: AtomicUsize,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            daily: HashMap::new(),
            intraday: HashMap::new(),
            quotes: Mutex::new(HashMap::new()),
            errors: HashMap::new(),
            quote_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_daily(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.daily.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_intraday(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.intraday.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_quote(self, ticker: &str, price: Decimal) -> Self {
        self.set_quote(ticker, price);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    pub fn set_quote(&self, ticker: &str, price: Decimal) {
        self.quotes
            .lock()
            .unwrap()
            .insert(ticker.to_string(), price);
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    fn check_error(&self, ticker: &str) -> Result<(), TraderError> {
        match self.errors.get(ticker) {
            Some(reason) => Err(TraderError::provider(reason.clone())),
            None => Ok(()),
        }
    }
}

impl MarketDataPort for MockMarketData {
    fn fetch_daily_series(
        &self,
        ticker: &str,
        _lookback_days: u32,
    ) -> Result<Vec<PriceBar>, TraderError> {
        self.check_error(ticker)?;
        Ok(self.daily.get(ticker).cloned().unwrap_or_default())
    }

    fn fetch_intraday_series(&self, ticker: &str) -> Result<Vec<PriceBar>, TraderError> {
        self.check_error(ticker)?;
        Ok(self.intraday.get(ticker).cloned().unwrap_or_default())
    }

    fn fetch_latest_quote(&self, ticker: &str) -> Result<Decimal, TraderError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error(ticker)?;
        self.quotes
            .lock()
            .unwrap()
            .get(ticker)
            .copied()
            .ok_or_else(|| TraderError::NoData {
                symbol: ticker.to_string(),
            })
    }
}

pub fn make_bar(timestamp: NaiveDateTime, close: f64) -> PriceBar {
    PriceBar {
        timestamp,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One daily bar per close, starting at `start`.
pub fn daily_bars(start: NaiveDate, closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let day = start + Duration::days(i as i64);
            make_bar(day.and_hms_opt(0, 0, 0).unwrap(), close)
        })
        .collect()
}

/// 15-minute bars from 09:15 on `day`.
pub fn intraday_bars(day: NaiveDate, closes: &[f64]) -> Vec<PriceBar> {
    let open = day.and_hms_opt(9, 15, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(open + Duration::minutes(15 * i as i64), close))
        .collect()
}

/// 50 flat closes at 10 followed by 30 at 20: one golden cross, no exit.
pub fn step_up_closes() -> Vec<f64> {
    let mut closes = vec![10.0; 50];
    closes.extend(std::iter::repeat_n(20.0, 30));
    closes
}

pub fn symbols() -> SymbolList {
    SymbolList::default()
}

pub fn memory_ledger() -> SqliteAdapter {
    let ledger = SqliteAdapter::in_memory().unwrap();
    ledger.initialize_schema().unwrap();
    ledger
}
