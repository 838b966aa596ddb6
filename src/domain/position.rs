//! Paper-trading position (one per account and symbol).

use rust_decimal::Decimal;
use serde::Serialize;

/// Money values are held at cent precision.
pub const MONEY_SCALE: u32 = 2;

/// Round a money amount to cents using banker's rounding.
pub fn to_money(value: Decimal) -> Decimal {
    value.round_dp(MONEY_SCALE)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    #[serde(skip)]
    pub account_id: i64,
    pub symbol: String,
    pub quantity: i64,
    #[serde(rename = "average_price", with = "rust_decimal::serde::float")]
    pub average_cost: Decimal,
}

impl Position {
    pub fn open(account_id: i64, symbol: &str, quantity: i64, price: Decimal) -> Self {
        Position {
            account_id,
            symbol: symbol.to_string(),
            quantity,
            average_cost: to_money(price),
        }
    }

    /// Position after buying `quantity` more shares at `price`; average cost
    /// becomes the quantity-weighted mean of the old and new lots.
    pub fn with_added(&self, quantity: i64, price: Decimal) -> Self {
        let old_qty = Decimal::from(self.quantity);
        let add_qty = Decimal::from(quantity);
        let total_qty = self.quantity + quantity;
        let average_cost =
            (self.average_cost * old_qty + price * add_qty) / Decimal::from(total_qty);
        Position {
            account_id: self.account_id,
            symbol: self.symbol.clone(),
            quantity: total_qty,
            average_cost: to_money(average_cost),
        }
    }

    /// Position after selling `quantity` shares; `None` once nothing is left.
    /// Average cost is unaffected by sells.
    pub fn with_removed(&self, quantity: i64) -> Option<Self> {
        let remaining = self.quantity - quantity;
        if remaining <= 0 {
            return None;
        }
        Some(Position {
            quantity: remaining,
            ..self.clone()
        })
    }

    pub fn cost_basis(&self) -> Decimal {
        self.average_cost * Decimal::from(self.quantity)
    }

    pub fn market_value(&self, price: Decimal) -> Decimal {
        price * Decimal::from(self.quantity)
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.market_value(price) - self.cost_basis()
    }
}
