//! Paper-trading account and its dashboard view.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::error::TraderError;
use super::position::Position;
use super::transaction::Transaction;
use crate::ports::ledger_port::LedgerPort;

pub const DEFAULT_INITIAL_BALANCE: Decimal = dec!(100000.00);
pub const RECENT_TRANSACTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    #[serde(rename = "balance", with = "rust_decimal::serde::float")]
    pub cash_balance: Decimal,
    /// Bumped on every balance write; used for compare-and-swap updates.
    #[serde(skip)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub account: Account,
    pub positions: Vec<Position>,
    pub transactions: Vec<Transaction>,
    pub allowed_symbols: Vec<String>,
}

/// Account summary with its open positions.
#[derive(Debug, Clone, Serialize)]
pub struct Holdings {
    pub account: Account,
    pub positions: Vec<Position>,
}

pub fn load_holdings(
    ledger: &dyn LedgerPort,
    owner: &str,
    initial_balance: Decimal,
) -> Result<Holdings, TraderError> {
    let account = ledger.open_account(owner, initial_balance)?;
    let positions = ledger.positions(account.id)?;
    Ok(Holdings { account, positions })
}

pub fn load_dashboard(
    ledger: &dyn LedgerPort,
    owner: &str,
    initial_balance: Decimal,
    allowed_symbols: &[String],
) -> Result<Dashboard, TraderError> {
    let Holdings { account, positions } = load_holdings(ledger, owner, initial_balance)?;
    let transactions = ledger.recent_transactions(account.id, RECENT_TRANSACTIONS)?;
    Ok(Dashboard {
        account,
        positions,
        transactions,
        allowed_symbols: allowed_symbols.to_vec(),
    })
}
