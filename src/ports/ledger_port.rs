//! Paper-trading ledger persistence port trait.

use rust_decimal::Decimal;

use crate::domain::account::Account;
use crate::domain::error::TraderError;
use crate::domain::execution::{TradeOrder, TradeOutcome};
use crate::domain::position::Position;
use crate::domain::transaction::Transaction;

pub trait LedgerPort {
    /// Fetch the owner's account, creating it with `initial_balance` on first use.
    fn open_account(&self, owner: &str, initial_balance: Decimal) -> Result<Account, TraderError>;

    fn positions(&self, account_id: i64) -> Result<Vec<Position>, TraderError>;

    fn position(&self, account_id: i64, symbol: &str) -> Result<Option<Position>, TraderError>;

    /// Newest first.
    fn recent_transactions(
        &self,
        account_id: i64,
        limit: usize,
    ) -> Result<Vec<Transaction>, TraderError>;

    /// Apply one trade as a single atomic unit.
    ///
    /// Implementations lock the account, re-read its balance and position,
    /// plan the trade with [`crate::domain::execution::plan_trade`] and write
    /// the transaction, balance and position change together. Any failure
    /// leaves the ledger untouched.
    fn apply_trade(
        &self,
        account_id: i64,
        order: &TradeOrder,
        market_price: Decimal,
    ) -> Result<TradeOutcome, TraderError>;
}
