//! Configuration validation and typed settings.
//!
//! Every value is checked before a command touches market data or storage.

use rust_decimal::Decimal;

use super::account::DEFAULT_INITIAL_BALANCE;
use super::backtest::{BacktestConfig, DEFAULT_FAST_SPAN, DEFAULT_LOOKBACK_DAYS, DEFAULT_SLOW_SPAN};
use super::error::TraderError;
use super::symbols::{DEFAULT_EXCHANGE_SUFFIX, SymbolList, parse_symbols};
use crate::ports::config_port::ConfigPort;

pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Typed view of the settings the engines' callers need.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub symbols: SymbolList,
    pub backtest: BacktestConfig,
    pub initial_balance: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            symbols: SymbolList::default(),
            backtest: BacktestConfig::default(),
            initial_balance: DEFAULT_INITIAL_BALANCE,
        }
    }
}

impl Settings {
    /// Builds settings without touching storage keys; ledger commands check
    /// those through [`validate_storage`] when the ledger is opened.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        validate_market_data(config)?;
        Ok(Settings {
            symbols: build_symbol_list(config)?,
            backtest: build_backtest_config(config)?,
            initial_balance: initial_balance(config)?,
        })
    }
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    build_symbol_list(config)?;
    build_backtest_config(config)?;
    initial_balance(config)?;
    validate_market_data(config)?;
    validate_storage(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TraderError {
    TraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub fn build_symbol_list(config: &dyn ConfigPort) -> Result<SymbolList, TraderError> {
    let suffix = config
        .get_string("symbols", "exchange_suffix")
        .unwrap_or_else(|| DEFAULT_EXCHANGE_SUFFIX.to_string());

    match config.get_string("symbols", "allowed") {
        None => Ok(SymbolList::new(
            SymbolList::default().allowed().to_vec(),
            suffix.trim(),
        )),
        Some(raw) => {
            let allowed =
                parse_symbols(&raw).map_err(|e| invalid("symbols", "allowed", e.to_string()))?;
            Ok(SymbolList::new(allowed, suffix.trim()))
        }
    }
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, TraderError> {
    let fast = config.get_int("backtest", "fast_span", DEFAULT_FAST_SPAN as i64);
    let slow = config.get_int("backtest", "slow_span", DEFAULT_SLOW_SPAN as i64);
    let lookback = config.get_int("backtest", "lookback_days", DEFAULT_LOOKBACK_DAYS as i64);

    if fast < 1 {
        return Err(invalid("backtest", "fast_span", "fast_span must be at least 1"));
    }
    if slow < 1 {
        return Err(invalid("backtest", "slow_span", "slow_span must be at least 1"));
    }
    if fast >= slow {
        return Err(invalid(
            "backtest",
            "fast_span",
            "fast_span must be shorter than slow_span",
        ));
    }
    validate_lookback(lookback).map_err(|reason| invalid("backtest", "lookback_days", reason))?;

    Ok(BacktestConfig {
        fast_span: fast as usize,
        slow_span: slow as usize,
        lookback_days: lookback as u32,
    })
}

/// Range check shared by config and per-request lookback overrides.
pub fn validate_lookback(days: i64) -> Result<u32, String> {
    if days < 1 || days > MAX_LOOKBACK_DAYS {
        return Err(format!(
            "lookback_days must be between 1 and {MAX_LOOKBACK_DAYS}"
        ));
    }
    Ok(days as u32)
}

fn initial_balance(config: &dyn ConfigPort) -> Result<Decimal, TraderError> {
    match config.get_decimal("account", "initial_balance") {
        None => Ok(DEFAULT_INITIAL_BALANCE),
        Some(parsed) => {
            let value = parsed.map_err(|raw| {
                invalid(
                    "account",
                    "initial_balance",
                    format!("initial_balance must be a decimal, got '{raw}'"),
                )
            })?;
            if value <= Decimal::ZERO {
                return Err(invalid(
                    "account",
                    "initial_balance",
                    "initial_balance must be positive",
                ));
            }
            Ok(value.round_dp(2))
        }
    }
}

fn validate_market_data(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let provider = config
        .get_string("market_data", "provider")
        .unwrap_or_else(|| "yahoo".to_string());
    match provider.trim() {
        "yahoo" => {
            let timeout = config.get_int("market_data", "timeout_secs", 10);
            if timeout < 1 {
                return Err(invalid(
                    "market_data",
                    "timeout_secs",
                    "timeout_secs must be at least 1",
                ));
            }
            Ok(())
        }
        "csv" => match config.get_string("market_data", "csv_dir") {
            Some(dir) if !dir.trim().is_empty() => Ok(()),
            _ => Err(TraderError::ConfigMissing {
                section: "market_data".to_string(),
                key: "csv_dir".to_string(),
            }),
        },
        other => Err(invalid(
            "market_data",
            "provider",
            format!("unknown provider '{other}', expected yahoo or csv"),
        )),
    }
}

pub fn validate_storage(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let backend = config
        .get_string("storage", "backend")
        .unwrap_or_else(|| "sqlite".to_string());
    match backend.trim() {
        "sqlite" => match config.get_string("sqlite", "path") {
            Some(path) if !path.trim().is_empty() => Ok(()),
            _ => Err(TraderError::ConfigMissing {
                section: "sqlite".to_string(),
                key: "path".to_string(),
            }),
        },
        "postgres" => match config.get_string("postgres", "conninfo") {
            Some(info) if !info.trim().is_empty() => Ok(()),
            _ => Err(TraderError::ConfigMissing {
                section: "postgres".to_string(),
                key: "conninfo".to_string(),
            }),
        },
        other => Err(invalid(
            "storage",
            "backend",
            format!("unknown backend '{other}', expected sqlite or postgres"),
        )),
    }
}
