//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
#[cfg(feature = "web")]
pub mod web;
pub mod yahoo_adapter;

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::error::TraderError;
use crate::domain::settings::validate_storage;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_data_port::MarketDataPort;

pub type SharedMarketData = Arc<dyn MarketDataPort + Send + Sync>;
pub type SharedLedger = Arc<dyn LedgerPort + Send + Sync>;

/// Build the market data provider named by `[market_data] provider`.
pub fn open_market_data(config: &dyn ConfigPort) -> Result<SharedMarketData, TraderError> {
    let provider = config
        .get_string("market_data", "provider")
        .unwrap_or_else(|| "yahoo".to_string());
    match provider.trim() {
        "yahoo" => Ok(Arc::new(yahoo_adapter::YahooAdapter::from_config(config)?)),
        "csv" => {
            let dir = config
                .get_string("market_data", "csv_dir")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "market_data".into(),
                    key: "csv_dir".into(),
                })?;
            Ok(Arc::new(csv_adapter::CsvAdapter::new(PathBuf::from(
                dir.trim(),
            ))))
        }
        other => Err(TraderError::ConfigInvalid {
            section: "market_data".into(),
            key: "provider".into(),
            reason: format!("unknown provider '{other}', expected yahoo or csv"),
        }),
    }
}

/// Build the ledger named by `[storage] backend` and make sure its schema exists.
pub fn open_ledger(config: &dyn ConfigPort) -> Result<SharedLedger, TraderError> {
    validate_storage(config)?;
    let backend = config
        .get_string("storage", "backend")
        .unwrap_or_else(|| "sqlite".to_string());
    match backend.trim() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let adapter = sqlite_adapter::SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            Ok(Arc::new(adapter))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let adapter = postgres_adapter::PostgresAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            Ok(Arc::new(adapter))
        }
        other => Err(TraderError::ConfigInvalid {
            section: "storage".into(),
            key: "backend".into(),
            reason: format!("backend '{other}' is not available in this build"),
        }),
    }
}
