//! Mark-to-market valuation of a paper account.

use rust_decimal::Decimal;
use serde::Serialize;

use super::account::Account;
use super::error::TraderError;
use super::position::Position;
use super::symbols::SymbolList;
use crate::ports::market_data_port::MarketDataPort;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionValuation {
    pub symbol: String,
    pub quantity: i64,
    #[serde(rename = "average_price", with = "rust_decimal::serde::float")]
    pub average_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub position_value: Decimal,
    #[serde(rename = "profit_loss", with = "rust_decimal::serde::float")]
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValuation {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cash_balance: Decimal,
    pub positions: Vec<PositionValuation>,
}

/// Value every position at a fresh quote. The first failed quote aborts the
/// whole valuation.
pub fn value_portfolio<F>(
    account: &Account,
    positions: &[Position],
    mut quote_fn: F,
) -> Result<PortfolioValuation, TraderError>
where
    F: FnMut(&str) -> Result<Decimal, TraderError>,
{
    let mut total_value = account.cash_balance;
    let mut valued = Vec::with_capacity(positions.len());

    for position in positions {
        let current_price = quote_fn(&position.symbol)?;
        let position_value = position.market_value(current_price);
        total_value += position_value;
        valued.push(PositionValuation {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            average_cost: position.average_cost,
            current_price,
            position_value,
            unrealized_pnl: position.unrealized_pnl(current_price),
        });
    }

    Ok(PortfolioValuation {
        total_value,
        cash_balance: account.cash_balance,
        positions: valued,
    })
}

/// [`value_portfolio`] with quotes drawn from a market data provider.
pub fn value_with_market(
    account: &Account,
    positions: &[Position],
    market: &dyn MarketDataPort,
    symbols: &SymbolList,
) -> Result<PortfolioValuation, TraderError> {
    value_portfolio(account, positions, |symbol| {
        market.fetch_latest_quote(&symbols.ticker(symbol))
    })
}
