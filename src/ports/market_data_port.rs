//! Market data access port trait.

use rust_decimal::Decimal;

use crate::domain::error::TraderError;
use crate::domain::ohlcv::PriceBar;

/// Blocking access to a quote vendor. Tickers carry the exchange suffix.
pub trait MarketDataPort {
    /// Daily bars covering the last `lookback_days` calendar days, oldest first.
    fn fetch_daily_series(
        &self,
        ticker: &str,
        lookback_days: u32,
    ) -> Result<Vec<PriceBar>, TraderError>;

    /// Today's 15-minute bars, oldest first.
    fn fetch_intraday_series(&self, ticker: &str) -> Result<Vec<PriceBar>, TraderError>;

    fn fetch_latest_quote(&self, ticker: &str) -> Result<Decimal, TraderError>;
}
