//! Tradable symbol allow-list.
//!
//! The list is configuration handed to callers; engines never hold it. Symbols
//! are bare exchange codes (`RELIANCE`); the provider ticker adds the exchange
//! suffix (`RELIANCE.NS`).

use std::collections::HashSet;

use super::error::TraderError;

pub const DEFAULT_SYMBOLS: &[&str] = &[
    "RELIANCE",
    "TCS",
    "INFY",
    "ICICIBANK",
    "HDFCBANK",
    "SBIN",
    "AXISBANK",
    "LT",
    "BHARTIARTL",
    "TITAN",
    "BAJFINANCE",
    "MARUTI",
    "SUNPHARMA",
    "WIPRO",
    "BSE",
];

pub const DEFAULT_EXCHANGE_SUFFIX: &str = ".NS";

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SymbolListError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolList {
    allowed: Vec<String>,
    exchange_suffix: String,
}

impl Default for SymbolList {
    fn default() -> Self {
        SymbolList::new(
            DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_EXCHANGE_SUFFIX,
        )
    }
}

impl SymbolList {
    pub fn new(allowed: Vec<String>, exchange_suffix: &str) -> Self {
        SymbolList {
            allowed,
            exchange_suffix: exchange_suffix.to_string(),
        }
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.allowed.iter().any(|s| s == symbol)
    }

    /// Resolve a caller-supplied symbol against the allow-list.
    ///
    /// Matching is exact: the list holds canonical upper-case codes and a
    /// lower-case request is treated as unknown.
    pub fn validate<'a>(&self, raw: Option<&'a str>) -> Result<&'a str, TraderError> {
        let symbol = match raw.map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => return Err(TraderError::invalid("stock symbol is required")),
        };
        if !self.contains(symbol) {
            return Err(TraderError::invalid(format!("invalid stock symbol: {symbol}")));
        }
        Ok(symbol)
    }

    pub fn ticker(&self, symbol: &str) -> String {
        format!("{}{}", symbol, self.exchange_suffix)
    }
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, SymbolListError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(SymbolListError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(SymbolListError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}
