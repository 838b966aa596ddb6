//! Paper trade execution.
//!
//! [`plan_trade`] is the pure part: given the current account and position it
//! validates the order and works out every row the trade touches. A
//! [`LedgerPort`] applies the plan atomically, re-reading the rows under its
//! own lock, so nothing here touches storage directly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::account::Account;
use super::error::TraderError;
use super::position::{Position, to_money};
use super::symbols::SymbolList;
use super::transaction::{NewTransaction, TradeAction, Transaction};
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_data_port::MarketDataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeOrder {
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: i64,
}

impl TradeOrder {
    pub fn new(symbol: &str, action: TradeAction, quantity: i64) -> Self {
        TradeOrder {
            symbol: symbol.to_string(),
            action,
            quantity,
        }
    }

    /// Build an order from raw request fields.
    pub fn parse(
        symbol: Option<&str>,
        action: Option<&str>,
        quantity: Option<&str>,
    ) -> Result<Self, TraderError> {
        let (symbol, action, quantity) = match (symbol, action, quantity) {
            (Some(s), Some(a), Some(q))
                if !s.trim().is_empty() && !a.trim().is_empty() && !q.trim().is_empty() =>
            {
                (s.trim(), a, q.trim())
            }
            _ => return Err(TraderError::invalid("missing required parameters")),
        };
        let action: TradeAction = action.parse()?;
        let quantity: i64 = quantity
            .parse()
            .map_err(|_| TraderError::invalid(format!("invalid quantity: {quantity}")))?;
        let order = TradeOrder::new(symbol, action, quantity);
        order.validate()?;
        Ok(order)
    }

    pub fn validate(&self) -> Result<(), TraderError> {
        if self.symbol.is_empty() {
            return Err(TraderError::invalid("stock symbol is required"));
        }
        if self.quantity <= 0 {
            return Err(TraderError::invalid("quantity must be a positive integer"));
        }
        Ok(())
    }
}

/// What a trade does to the account's position row.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionChange {
    Create(Position),
    Update {
        previous_quantity: i64,
        position: Position,
    },
    Delete {
        symbol: String,
        previous_quantity: i64,
    },
}

/// Every mutation one trade performs, computed before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePlan {
    pub transaction: NewTransaction,
    pub new_balance: Decimal,
    pub position_change: PositionChange,
}

pub fn plan_trade(
    account: &Account,
    position: Option<&Position>,
    order: &TradeOrder,
    market_price: Decimal,
    now: DateTime<Utc>,
) -> Result<TradePlan, TraderError> {
    order.validate()?;
    let price = to_money(market_price);
    if price <= Decimal::ZERO {
        return Err(TraderError::invalid(format!(
            "market price must be positive, got {market_price}"
        )));
    }
    if let Some(pos) = position {
        if pos.symbol != order.symbol || pos.account_id != account.id {
            return Err(TraderError::invalid(format!(
                "position {} does not belong to order {}",
                pos.symbol, order.symbol
            )));
        }
    }

    let transaction = NewTransaction::new(
        account.id,
        &order.symbol,
        order.action,
        order.quantity,
        price,
        now,
    );
    let amount = transaction.total_amount;

    match order.action {
        TradeAction::Buy => {
            if account.cash_balance < amount {
                return Err(TraderError::InsufficientFunds {
                    required: amount,
                    available: account.cash_balance,
                });
            }
            let position_change = match position {
                None => PositionChange::Create(Position::open(
                    account.id,
                    &order.symbol,
                    order.quantity,
                    price,
                )),
                Some(pos) => PositionChange::Update {
                    previous_quantity: pos.quantity,
                    position: pos.with_added(order.quantity, price),
                },
            };
            Ok(TradePlan {
                transaction,
                new_balance: account.cash_balance - amount,
                position_change,
            })
        }
        TradeAction::Sell => {
            let pos = position.ok_or_else(|| TraderError::NoPosition {
                symbol: order.symbol.clone(),
            })?;
            if pos.quantity < order.quantity {
                return Err(TraderError::InsufficientShares {
                    symbol: order.symbol.clone(),
                    requested: order.quantity,
                    held: pos.quantity,
                });
            }
            let position_change = match pos.with_removed(order.quantity) {
                Some(reduced) => PositionChange::Update {
                    previous_quantity: pos.quantity,
                    position: reduced,
                },
                None => PositionChange::Delete {
                    symbol: pos.symbol.clone(),
                    previous_quantity: pos.quantity,
                },
            };
            Ok(TradePlan {
                transaction,
                new_balance: account.cash_balance + amount,
                position_change,
            })
        }
    }
}

/// Result of a committed trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOutcome {
    pub new_balance: Decimal,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub success: bool,
    pub message: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_balance: Decimal,
}

impl From<&TradeOutcome> for TradeReceipt {
    fn from(outcome: &TradeOutcome) -> Self {
        TradeReceipt {
            success: true,
            message: format!("{} order executed successfully", outcome.transaction.action),
            new_balance: outcome.new_balance,
        }
    }
}

/// Price an order against the live quote and commit it to the ledger.
pub fn execute_trade(
    ledger: &dyn LedgerPort,
    market: &dyn MarketDataPort,
    symbols: &SymbolList,
    account: &Account,
    order: &TradeOrder,
) -> Result<TradeOutcome, TraderError> {
    order.validate()?;
    let symbol = symbols.validate(Some(&order.symbol))?;
    let market_price = market.fetch_latest_quote(&symbols.ticker(symbol))?;

    match ledger.apply_trade(account.id, order, market_price) {
        Ok(outcome) => {
            info!(
                owner = %account.owner,
                symbol,
                action = %order.action,
                quantity = order.quantity,
                price = %outcome.transaction.price,
                new_balance = %outcome.new_balance,
                "trade executed"
            );
            Ok(outcome)
        }
        Err(e) => {
            warn!(
                owner = %account.owner,
                symbol,
                action = %order.action,
                quantity = order.quantity,
                error = %e,
                "trade rejected"
            );
            Err(e)
        }
    }
}
