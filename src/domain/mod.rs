//! Core domain types and logic.

pub mod account;
pub mod backtest;
pub mod ema;
pub mod error;
pub mod execution;
pub mod ohlcv;
pub mod position;
pub mod settings;
pub mod symbols;
pub mod transaction;
pub mod valuation;
