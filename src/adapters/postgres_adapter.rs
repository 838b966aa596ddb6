//! PostgreSQL ledger adapter.
//!
//! Trades run in a SERIALIZABLE transaction that locks the account row (and
//! the position row, when present) with `SELECT ... FOR UPDATE` before planning.
//! A serialization failure surfaces as a persistence error; there is no retry.

use chrono::{DateTime, Utc};
use postgres::{GenericClient, IsolationLevel, NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::account::Account;
use crate::domain::error::TraderError;
use crate::domain::execution::{PositionChange, TradeOrder, TradeOutcome, plan_trade};
use crate::domain::position::Position;
use crate::domain::transaction::{NewTransaction, TradeAction, Transaction};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;

type Manager = PostgresConnectionManager<NoTls>;

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

fn pool_err(e: r2d2::Error) -> TraderError {
    TraderError::persistence(e.to_string())
}

fn pg_err(e: postgres::Error) -> TraderError {
    TraderError::persistence(e.to_string())
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let conninfo =
            config
                .get_string("postgres", "conninfo")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "postgres".into(),
                    key: "conninfo".into(),
                })?;

        let pg_config: postgres::Config =
            conninfo.parse().map_err(|e: postgres::Error| TraderError::ConfigInvalid {
                section: "postgres".into(),
                key: "conninfo".into(),
                reason: e.to_string(),
            })?;

        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(PostgresConnectionManager::new(pg_config, NoTls))
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn client(&self) -> Result<PooledConnection<Manager>, TraderError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), TraderError> {
        let mut client = self.client()?;
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS accounts (
                    id BIGSERIAL PRIMARY KEY,
                    owner TEXT NOT NULL UNIQUE,
                    cash_balance NUMERIC(14, 2) NOT NULL,
                    version BIGINT NOT NULL DEFAULT 0,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                );
                CREATE TABLE IF NOT EXISTS positions (
                    account_id BIGINT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                    symbol TEXT NOT NULL,
                    quantity BIGINT NOT NULL CHECK (quantity > 0),
                    average_cost NUMERIC(14, 2) NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (account_id, symbol)
                );
                CREATE TABLE IF NOT EXISTS transactions (
                    id BIGSERIAL PRIMARY KEY,
                    account_id BIGINT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                    symbol TEXT NOT NULL,
                    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('BUY', 'SELL')),
                    quantity BIGINT NOT NULL CHECK (quantity > 0),
                    price NUMERIC(14, 2) NOT NULL,
                    total_amount NUMERIC(14, 2) NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id, id);",
            )
            .map_err(pg_err)
    }
}

fn account_from_row(row: &Row) -> Account {
    Account {
        id: row.get(0),
        owner: row.get(1),
        cash_balance: row.get(2),
        version: row.get(3),
        created_at: row.get(4),
        updated_at: row.get(5),
    }
}

fn position_from_row(row: &Row) -> Position {
    Position {
        account_id: row.get(0),
        symbol: row.get(1),
        quantity: row.get(2),
        average_cost: row.get(3),
    }
}

fn transaction_from_row(row: &Row) -> Result<Transaction, TraderError> {
    let kind: String = row.get(3);
    let action = match kind.as_str() {
        "BUY" => TradeAction::Buy,
        "SELL" => TradeAction::Sell,
        other => {
            return Err(TraderError::persistence(format!(
                "unknown transaction type {other}"
            )));
        }
    };
    Ok(Transaction {
        id: row.get(0),
        account_id: row.get(1),
        symbol: row.get(2),
        action,
        quantity: row.get(4),
        price: row.get(5),
        total_amount: row.get(6),
        created_at: row.get(7),
    })
}

fn select_position(
    client: &mut impl GenericClient,
    account_id: i64,
    symbol: &str,
    for_update: bool,
) -> Result<Option<Position>, TraderError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!(
        "SELECT account_id, symbol, quantity, average_cost
         FROM positions WHERE account_id = $1 AND symbol = $2{lock}"
    );
    let row = client
        .query_opt(sql.as_str(), &[&account_id, &symbol])
        .map_err(pg_err)?;
    Ok(row.as_ref().map(position_from_row))
}

fn insert_transaction(
    client: &mut impl GenericClient,
    tx: &NewTransaction,
) -> Result<i64, TraderError> {
    let row = client
        .query_one(
            "INSERT INTO transactions
                (account_id, symbol, transaction_type, quantity, price, total_amount, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
            &[
                &tx.account_id,
                &tx.symbol,
                &tx.action.as_str(),
                &tx.quantity,
                &tx.price,
                &tx.total_amount,
                &tx.created_at,
            ],
        )
        .map_err(pg_err)?;
    Ok(row.get(0))
}

fn expect_one_row(changed: u64, what: &str) -> Result<(), TraderError> {
    if changed == 1 {
        Ok(())
    } else {
        Err(TraderError::persistence(format!(
            "concurrent modification of {what}"
        )))
    }
}

fn write_position_change(
    client: &mut impl GenericClient,
    account_id: i64,
    change: &PositionChange,
    now: DateTime<Utc>,
) -> Result<(), TraderError> {
    let changed = match change {
        PositionChange::Create(position) => client.execute(
            "INSERT INTO positions (account_id, symbol, quantity, average_cost, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)",
            &[
                &account_id,
                &position.symbol,
                &position.quantity,
                &position.average_cost,
                &now,
            ],
        ),
        PositionChange::Update {
            previous_quantity,
            position,
        } => client.execute(
            "UPDATE positions SET quantity = $1, average_cost = $2, updated_at = $3
             WHERE account_id = $4 AND symbol = $5 AND quantity = $6",
            &[
                &position.quantity,
                &position.average_cost,
                &now,
                &account_id,
                &position.symbol,
                previous_quantity,
            ],
        ),
        PositionChange::Delete {
            symbol,
            previous_quantity,
        } => client.execute(
            "DELETE FROM positions WHERE account_id = $1 AND symbol = $2 AND quantity = $3",
            &[&account_id, symbol, previous_quantity],
        ),
    }
    .map_err(pg_err)?;
    expect_one_row(changed, "position")
}

impl LedgerPort for PostgresAdapter {
    fn open_account(&self, owner: &str, initial_balance: Decimal) -> Result<Account, TraderError> {
        let mut client = self.client()?;
        let now = Utc::now();

        let created = client
            .execute(
                "INSERT INTO accounts (owner, cash_balance, version, created_at, updated_at)
                 VALUES ($1, $2, 0, $3, $3)
                 ON CONFLICT (owner) DO NOTHING",
                &[&owner, &initial_balance, &now],
            )
            .map_err(pg_err)?;
        if created == 1 {
            info!(owner, balance = %initial_balance, "created paper account");
        }

        let row = client
            .query_one(
                "SELECT id, owner, cash_balance, version, created_at, updated_at
                 FROM accounts WHERE owner = $1",
                &[&owner],
            )
            .map_err(pg_err)?;
        Ok(account_from_row(&row))
    }

    fn positions(&self, account_id: i64) -> Result<Vec<Position>, TraderError> {
        let mut client = self.client()?;
        let rows = client
            .query(
                "SELECT account_id, symbol, quantity, average_cost
                 FROM positions WHERE account_id = $1 ORDER BY symbol",
                &[&account_id],
            )
            .map_err(pg_err)?;
        Ok(rows.iter().map(position_from_row).collect())
    }

    fn position(&self, account_id: i64, symbol: &str) -> Result<Option<Position>, TraderError> {
        let mut client = self.client()?;
        select_position(&mut *client, account_id, symbol, false)
    }

    fn recent_transactions(
        &self,
        account_id: i64,
        limit: usize,
    ) -> Result<Vec<Transaction>, TraderError> {
        let mut client = self.client()?;
        let rows = client
            .query(
                "SELECT id, account_id, symbol, transaction_type, quantity, price, total_amount, created_at
                 FROM transactions WHERE account_id = $1
                 ORDER BY id DESC LIMIT $2",
                &[&account_id, &(limit as i64)],
            )
            .map_err(pg_err)?;
        rows.iter().map(transaction_from_row).collect()
    }

    fn apply_trade(
        &self,
        account_id: i64,
        order: &TradeOrder,
        market_price: Decimal,
    ) -> Result<TradeOutcome, TraderError> {
        let mut client = self.client()?;
        let mut tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .map_err(pg_err)?;

        let account = tx
            .query_opt(
                "SELECT id, owner, cash_balance, version, created_at, updated_at
                 FROM accounts WHERE id = $1 FOR UPDATE",
                &[&account_id],
            )
            .map_err(pg_err)?
            .as_ref()
            .map(account_from_row)
            .ok_or_else(|| {
                TraderError::persistence(format!("account {account_id} does not exist"))
            })?;
        let position = select_position(&mut tx, account_id, &order.symbol, true)?;

        let now = Utc::now();
        let plan = plan_trade(&account, position.as_ref(), order, market_price, now)?;

        let transaction_id = insert_transaction(&mut tx, &plan.transaction)?;
        let changed = tx
            .execute(
                "UPDATE accounts SET cash_balance = $1, version = version + 1, updated_at = $2
                 WHERE id = $3 AND version = $4",
                &[&plan.new_balance, &now, &account.id, &account.version],
            )
            .map_err(pg_err)?;
        expect_one_row(changed, &format!("account {}", account.id))?;
        write_position_change(&mut tx, account_id, &plan.position_change, now)?;

        tx.commit().map_err(pg_err)?;

        Ok(TradeOutcome {
            new_balance: plan.new_balance,
            transaction: plan.transaction.into_recorded(transaction_id),
        })
    }
}
