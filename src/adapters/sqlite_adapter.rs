//! SQLite ledger adapter.
//!
//! Money columns are TEXT holding decimal strings; timestamps are RFC 3339.
//! Trades run inside `BEGIN IMMEDIATE`, which takes the database write lock
//! before the balance and position are read.

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::account::Account;
use crate::domain::error::TraderError;
use crate::domain::execution::{PositionChange, TradeOrder, TradeOutcome, plan_trade};
use crate::domain::position::Position;
use crate::domain::transaction::{NewTransaction, TradeAction, Transaction};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;

const DEFAULT_BUSY_TIMEOUT_MS: i64 = 5_000;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> TraderError {
    TraderError::persistence(e.to_string())
}

fn sql_err(e: rusqlite::Error) -> TraderError {
    TraderError::persistence(e.to_string())
}

fn with_pragmas(manager: SqliteConnectionManager, busy_timeout: Duration) -> SqliteConnectionManager {
    manager.with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        let busy_timeout = config
            .get_int("sqlite", "busy_timeout_ms", DEFAULT_BUSY_TIMEOUT_MS)
            .max(0) as u64;

        let manager = with_pragmas(
            SqliteConnectionManager::file(&db_path),
            Duration::from_millis(busy_timeout),
        );
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        debug!(path = %db_path, pool_size, "opened sqlite ledger");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, TraderError> {
        let manager = with_pragmas(
            SqliteConnectionManager::memory(),
            Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS as u64),
        );
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TraderError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), TraderError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL UNIQUE,
                cash_balance TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS positions (
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                average_cost TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (account_id, symbol)
            );
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                symbol TEXT NOT NULL,
                transaction_type TEXT NOT NULL CHECK (transaction_type IN ('BUY', 'SELL')),
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                price TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id, id);",
        )
        .map_err(sql_err)?;

        Ok(())
    }
}

fn conversion_failure(
    raw: &str,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(raw.len(), rusqlite::types::Type::Text, Box::new(e))
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_failure(&raw, e))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(&raw, e))
}

fn action_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<TradeAction> {
    let raw: String = row.get(idx)?;
    match raw.as_str() {
        "BUY" => Ok(TradeAction::Buy),
        "SELL" => Ok(TradeAction::Sell),
        _ => Err(rusqlite::Error::InvalidColumnType(
            idx,
            raw,
            rusqlite::types::Type::Text,
        )),
    }
}

const ACCOUNT_COLUMNS: &str = "id, owner, cash_balance, version, created_at, updated_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        owner: row.get(1)?,
        cash_balance: decimal_column(row, 2)?,
        version: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        account_id: row.get(0)?,
        symbol: row.get(1)?,
        quantity: row.get(2)?,
        average_cost: decimal_column(row, 3)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        symbol: row.get(2)?,
        action: action_column(row, 3)?,
        quantity: row.get(4)?,
        price: decimal_column(row, 5)?,
        total_amount: decimal_column(row, 6)?,
        created_at: timestamp_column(row, 7)?,
    })
}

fn load_account(conn: &Connection, account_id: i64) -> Result<Option<Account>, TraderError> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
        params![account_id],
        account_from_row,
    )
    .optional()
    .map_err(sql_err)
}

fn load_position(
    conn: &Connection,
    account_id: i64,
    symbol: &str,
) -> Result<Option<Position>, TraderError> {
    conn.query_row(
        "SELECT account_id, symbol, quantity, average_cost
         FROM positions WHERE account_id = ?1 AND symbol = ?2",
        params![account_id, symbol],
        position_from_row,
    )
    .optional()
    .map_err(sql_err)
}

fn insert_transaction(conn: &Connection, tx: &NewTransaction) -> Result<i64, TraderError> {
    conn.execute(
        "INSERT INTO transactions
            (account_id, symbol, transaction_type, quantity, price, total_amount, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            tx.account_id,
            tx.symbol,
            tx.action.as_str(),
            tx.quantity,
            tx.price.to_string(),
            tx.total_amount.to_string(),
            tx.created_at.to_rfc3339()
        ],
    )
    .map_err(sql_err)?;
    Ok(conn.last_insert_rowid())
}

fn expect_one_row(changed: usize, what: &str) -> Result<(), TraderError> {
    if changed == 1 {
        Ok(())
    } else {
        Err(TraderError::persistence(format!(
            "concurrent modification of {what}"
        )))
    }
}

fn write_balance(
    conn: &Connection,
    account: &Account,
    new_balance: Decimal,
    now: DateTime<Utc>,
) -> Result<(), TraderError> {
    let changed = conn
        .execute(
            "UPDATE accounts SET cash_balance = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3 AND version = ?4",
            params![
                new_balance.to_string(),
                now.to_rfc3339(),
                account.id,
                account.version
            ],
        )
        .map_err(sql_err)?;
    expect_one_row(changed, &format!("account {}", account.id))
}

fn write_position_change(
    conn: &Connection,
    account_id: i64,
    change: &PositionChange,
    now: DateTime<Utc>,
) -> Result<(), TraderError> {
    let changed = match change {
        PositionChange::Create(position) => conn.execute(
            "INSERT INTO positions (account_id, symbol, quantity, average_cost, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                account_id,
                position.symbol,
                position.quantity,
                position.average_cost.to_string(),
                now.to_rfc3339()
            ],
        ),
        PositionChange::Update {
            previous_quantity,
            position,
        } => conn.execute(
            "UPDATE positions SET quantity = ?1, average_cost = ?2, updated_at = ?3
             WHERE account_id = ?4 AND symbol = ?5 AND quantity = ?6",
            params![
                position.quantity,
                position.average_cost.to_string(),
                now.to_rfc3339(),
                account_id,
                position.symbol,
                previous_quantity
            ],
        ),
        PositionChange::Delete {
            symbol,
            previous_quantity,
        } => conn.execute(
            "DELETE FROM positions WHERE account_id = ?1 AND symbol = ?2 AND quantity = ?3",
            params![account_id, symbol, previous_quantity],
        ),
    }
    .map_err(sql_err)?;
    expect_one_row(changed, "position")
}

impl LedgerPort for SqliteAdapter {
    fn open_account(&self, owner: &str, initial_balance: Decimal) -> Result<Account, TraderError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let created = conn
            .execute(
                "INSERT INTO accounts (owner, cash_balance, version, created_at, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?3)
                 ON CONFLICT(owner) DO NOTHING",
                params![owner, initial_balance.to_string(), now],
            )
            .map_err(sql_err)?;
        if created == 1 {
            info!(owner, balance = %initial_balance, "created paper account");
        }

        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner = ?1"),
            params![owner],
            account_from_row,
        )
        .map_err(sql_err)
    }

    fn positions(&self, account_id: i64) -> Result<Vec<Position>, TraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT account_id, symbol, quantity, average_cost
                 FROM positions WHERE account_id = ?1 ORDER BY symbol",
            )
            .map_err(sql_err)?;

        let rows = stmt
            .query_map(params![account_id], position_from_row)
            .map_err(sql_err)?;

        let mut positions = Vec::new();
        for row in rows {
            positions.push(row.map_err(sql_err)?);
        }
        Ok(positions)
    }

    fn position(&self, account_id: i64, symbol: &str) -> Result<Option<Position>, TraderError> {
        let conn = self.conn()?;
        load_position(&conn, account_id, symbol)
    }

    fn recent_transactions(
        &self,
        account_id: i64,
        limit: usize,
    ) -> Result<Vec<Transaction>, TraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, account_id, symbol, transaction_type, quantity, price, total_amount, created_at
                 FROM transactions WHERE account_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(sql_err)?;

        let rows = stmt
            .query_map(params![account_id, limit as i64], transaction_from_row)
            .map_err(sql_err)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row.map_err(sql_err)?);
        }
        Ok(transactions)
    }

    fn apply_trade(
        &self,
        account_id: i64,
        order: &TradeOrder,
        market_price: Decimal,
    ) -> Result<TradeOutcome, TraderError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_err)?;

        let account = load_account(&tx, account_id)?.ok_or_else(|| {
            TraderError::persistence(format!("account {account_id} does not exist"))
        })?;
        let position = load_position(&tx, account_id, &order.symbol)?;

        let now = Utc::now();
        let plan = plan_trade(&account, position.as_ref(), order, market_price, now)?;

        let transaction_id = insert_transaction(&tx, &plan.transaction)?;
        write_balance(&tx, &account, plan.new_balance, now)?;
        write_position_change(&tx, account_id, &plan.position_change, now)?;

        tx.commit().map_err(sql_err)?;

        Ok(TradeOutcome {
            new_balance: plan.new_balance,
            transaction: plan.transaction.into_recorded(transaction_id),
        })
    }
}
