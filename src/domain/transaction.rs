//! Append-only trade audit log entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::error::TraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = TraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            other => Err(TraderError::invalid(format!("unknown action: {other}"))),
        }
    }
}

/// A transaction ready to be written; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub account_id: i64,
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: i64,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    pub fn new(
        account_id: i64,
        symbol: &str,
        action: TradeAction,
        quantity: i64,
        price: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        NewTransaction {
            account_id,
            symbol: symbol.to_string(),
            action,
            quantity,
            price,
            total_amount: price * Decimal::from(quantity),
            created_at,
        }
    }

    pub fn into_recorded(self, id: i64) -> Transaction {
        Transaction {
            id,
            account_id: self.account_id,
            symbol: self.symbol,
            action: self.action,
            quantity: self.quantity,
            price: self.price,
            total_amount: self.total_amount,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: i64,
    #[serde(skip)]
    pub account_id: i64,
    pub symbol: String,
    #[serde(rename = "transaction_type")]
    pub action: TradeAction,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn action_parsing() {
        assert_eq!("BUY".parse::<TradeAction>().unwrap(), TradeAction::Buy);
        assert_eq!("sell".parse::<TradeAction>().unwrap(), TradeAction::Sell);
        assert_eq!(" Buy ".parse::<TradeAction>().unwrap(), TradeAction::Buy);
        assert!(matches!(
            "HOLD".parse::<TradeAction>(),
            Err(TraderError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn action_display() {
        assert_eq!(TradeAction::Buy.to_string(), "BUY");
        assert_eq!(TradeAction::Sell.to_string(), "SELL");
    }

    #[test]
    fn total_amount_is_quantity_times_price() {
        let tx = NewTransaction::new(1, "SBIN", TradeAction::Sell, 7, dec!(812.35), Utc::now());
        assert_eq!(tx.total_amount, dec!(5686.45));
    }

    #[test]
    fn recorded_keeps_fields() {
        let now = Utc::now();
        let tx = NewTransaction::new(3, "LT", TradeAction::Buy, 2, dec!(10.50), now).into_recorded(42);
        assert_eq!(tx.id, 42);
        assert_eq!(tx.account_id, 3);
        assert_eq!(tx.symbol, "LT");
        assert_eq!(tx.total_amount, dec!(21.00));
        assert_eq!(tx.created_at, now);

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["transaction_type"], "BUY");
        assert_eq!(json["total_amount"], 21.0);
    }
}
