//! CSV file market data adapter.
//!
//! Each ticker lives in `{dir}/{ticker}.csv` with a `Date,Open,High,Low,Close`
//! header. Dates are either `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::{PriceBar, price_to_money};
use crate::ports::market_data_port::MarketDataPort;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }

    /// All bars in the ticker's file, oldest first.
    fn load(&self, ticker: &str) -> Result<Vec<PriceBar>, TraderError> {
        let path = self.csv_path(ticker);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TraderError::NoData {
                    symbol: ticker.to_string(),
                });
            }
            Err(e) => {
                return Err(TraderError::provider(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record =
                result.map_err(|e| TraderError::provider(format!("CSV parse error: {}", e)))?;

            let date_str = record
                .get(0)
                .ok_or_else(|| TraderError::provider("missing date column"))?;
            let timestamp = parse_timestamp(date_str.trim())?;

            let column = |idx: usize, name: &str| -> Result<f64, TraderError> {
                record
                    .get(idx)
                    .ok_or_else(|| TraderError::provider(format!("missing {} column", name)))?
                    .trim()
                    .parse()
                    .map_err(|e| TraderError::provider(format!("invalid {} value: {}", name, e)))
            };

            bars.push(PriceBar {
                timestamp,
                open: column(1, "open")?,
                high: column(2, "high")?,
                low: column(3, "low")?,
                close: column(4, "close")?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, TraderError> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|e| TraderError::provider(format!("invalid date format '{}': {}", value, e)))
}

impl MarketDataPort for CsvAdapter {
    fn fetch_daily_series(
        &self,
        ticker: &str,
        lookback_days: u32,
    ) -> Result<Vec<PriceBar>, TraderError> {
        let bars = self.load(ticker)?;
        let Some(newest) = bars.last().map(PriceBar::date) else {
            return Ok(bars);
        };
        let start = newest - Duration::days(i64::from(lookback_days));
        Ok(bars.into_iter().filter(|b| b.date() > start).collect())
    }

    fn fetch_intraday_series(&self, ticker: &str) -> Result<Vec<PriceBar>, TraderError> {
        let bars = self.load(ticker)?;
        let Some(newest) = bars.last().map(PriceBar::date) else {
            return Ok(bars);
        };
        Ok(bars.into_iter().filter(|b| b.date() == newest).collect())
    }

    fn fetch_latest_quote(&self, ticker: &str) -> Result<Decimal, TraderError> {
        let bars = self.load(ticker)?;
        let newest = bars.last().ok_or_else(|| TraderError::NoData {
            symbol: ticker.to_string(),
        })?;
        price_to_money(newest.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let daily = "Date,Open,High,Low,Close\n\
            2024-01-17,110.0,120.0,105.0,115.0\n\
            2024-01-15,100.0,110.0,90.0,105.0\n\
            2024-01-16,105.0,115.0,100.0,110.0\n\
            2023-12-01,90.0,95.0,85.0,92.0\n";
        fs::write(path.join("TCS.NS.csv"), daily).unwrap();

        let intraday = "Date,Open,High,Low,Close\n\
            2024-01-16 15:15:00,50.0,51.0,49.0,50.5\n\
            2024-01-17 09:15:00,51.0,52.0,50.0,51.5\n\
            2024-01-17 09:30:00,51.5,53.0,51.0,52.257\n";
        fs::write(path.join("INFY.NS.csv"), intraday).unwrap();

        fs::write(path.join("SBIN.NS.csv"), "Date,Open,High,Low,Close\n").unwrap();
        fs::write(
            path.join("BAD.NS.csv"),
            "Date,Open,High,Low,Close\n2024-01-15,1.0,2.0,0.5,oops\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn daily_series_sorted_and_windowed() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_daily_series("TCS.NS", 7).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].high, 110.0);
        assert_eq!(bars[0].low, 90.0);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[2].close, 115.0);

        let all = adapter.fetch_daily_series("TCS.NS", 365).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn lookback_window_excludes_boundary_day() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_daily_series("TCS.NS", 1).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 115.0);
    }

    #[test]
    fn intraday_keeps_newest_day() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_intraday_series("INFY.NS").unwrap();
        assert_eq!(bars.len(), 2);
        assert!(
            bars.iter()
                .all(|b| b.date() == NaiveDate::from_ymd_opt(2024, 1, 17).unwrap())
        );
    }

    #[test]
    fn latest_quote_is_newest_close() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        assert_eq!(adapter.fetch_latest_quote("TCS.NS").unwrap(), dec!(115.00));
        assert_eq!(adapter.fetch_latest_quote("INFY.NS").unwrap(), dec!(52.26));
    }

    #[test]
    fn empty_file_yields_no_bars() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        assert!(adapter.fetch_daily_series("SBIN.NS", 30).unwrap().is_empty());
        assert!(matches!(
            adapter.fetch_latest_quote("SBIN.NS"),
            Err(TraderError::NoData { .. })
        ));
    }

    #[test]
    fn missing_file_is_no_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        match adapter.fetch_daily_series("XYZ.NS", 30) {
            Err(TraderError::NoData { symbol }) => assert_eq!(symbol, "XYZ.NS"),
            other => panic!("expected NoData, got {other:?}"),
        }
    }

    #[test]
    fn malformed_value_is_provider_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        match adapter.fetch_daily_series("BAD.NS", 30) {
            Err(TraderError::Provider { reason }) => assert!(reason.contains("close")),
            other => panic!("expected Provider error, got {other:?}"),
        }
    }
}
