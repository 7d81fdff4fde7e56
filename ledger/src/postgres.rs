//! PostgreSQL ledger store.
//!
//! Each unit of work is one database transaction. Wallet rows read through it
//! are taken with `SELECT ... FOR UPDATE`, so two operations touching the same
//! wallet run one after the other instead of losing an update.

use async_trait::async_trait;
use fxwallet_common::{
    Currency, LedgerTransaction, NewTransaction, OperationKind, Result, TransactionId, UserId,
    Wallet, WalletError, WalletId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use crate::store::{LedgerStore, UnitOfWork};

const LEDGER_SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS wallets (
        id BIGSERIAL PRIMARY KEY,
        owner_id BIGINT NOT NULL,
        currency TEXT NOT NULL,
        balance BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id BIGSERIAL PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        user_id BIGINT NOT NULL,
        operation TEXT NOT NULL,
        income_wallet BIGINT REFERENCES wallets (id),
        outcome_wallet BIGINT REFERENCES wallets (id),
        income_amount BIGINT NOT NULL,
        outcome_amount BIGINT NOT NULL,
        income_currency TEXT,
        outcome_currency TEXT,
        rate DOUBLE PRECISION
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transactions_user_idx ON transactions (user_id, id)
    "#,
];

const WALLET_COLUMNS: &str = "id, owner_id, currency, balance";

const TRANSACTION_COLUMNS: &str = "id, created_at, user_id, operation, income_wallet, \
    outcome_wallet, income_amount, outcome_amount, income_currency, outcome_currency, rate";

/// Map a driver error onto the ledger taxonomy. The message is kept verbatim.
pub(crate) fn db_error(err: sqlx::Error) -> WalletError {
    match err {
        sqlx::Error::PoolTimedOut => WalletError::Timeout(err.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
            WalletError::ConnectionFailed(err.to_string())
        }
        other => WalletError::Database(other.to_string()),
    }
}

fn parse_currency(code: &str) -> Result<Currency> {
    code.parse::<Currency>()
        .map_err(|e| WalletError::Database(e.to_string()))
}

fn row_to_wallet(row: &PgRow) -> Result<Wallet> {
    let currency: String = row.try_get("currency").map_err(db_error)?;
    Ok(Wallet::new(
        WalletId::new(row.try_get("id").map_err(db_error)?),
        UserId::new(row.try_get("owner_id").map_err(db_error)?),
        parse_currency(&currency)?,
        row.try_get("balance").map_err(db_error)?,
    ))
}

fn row_to_transaction(row: &PgRow) -> Result<LedgerTransaction> {
    let operation: String = row.try_get("operation").map_err(db_error)?;
    let income_currency: Option<String> = row.try_get("income_currency").map_err(db_error)?;
    let outcome_currency: Option<String> = row.try_get("outcome_currency").map_err(db_error)?;
    let income_wallet: Option<i64> = row.try_get("income_wallet").map_err(db_error)?;
    let outcome_wallet: Option<i64> = row.try_get("outcome_wallet").map_err(db_error)?;

    Ok(LedgerTransaction {
        id: TransactionId::new(row.try_get("id").map_err(db_error)?),
        timestamp: row.try_get("created_at").map_err(db_error)?,
        user_id: UserId::new(row.try_get("user_id").map_err(db_error)?),
        operation: operation
            .parse::<OperationKind>()
            .map_err(WalletError::Database)?,
        income_wallet: income_wallet.map(WalletId::new),
        outcome_wallet: outcome_wallet.map(WalletId::new),
        income_amount: row.try_get("income_amount").map_err(db_error)?,
        outcome_amount: row.try_get("outcome_amount").map_err(db_error)?,
        income_currency: income_currency.as_deref().map(parse_currency).transpose()?,
        outcome_currency: outcome_currency.as_deref().map(parse_currency).transpose()?,
        applied_rate: row.try_get("rate").map_err(db_error)?,
    })
}

/// [`LedgerStore`] over the `wallets` and `transactions` tables.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a store on an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the ledger tables if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in LEDGER_SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }
        debug!("Ledger schema ready");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn create_wallet(&self, owner: UserId, currency: Currency) -> Result<Wallet> {
        let row = sqlx::query(&format!(
            "INSERT INTO wallets (owner_id, currency) VALUES ($1, $2) RETURNING {WALLET_COLUMNS}"
        ))
        .bind(owner.get())
        .bind(currency.code())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        row_to_wallet(&row)
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(row_to_wallet).transpose()
    }

    async fn wallets_of(&self, owner: UserId) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE owner_id = $1 ORDER BY id"
        ))
        .bind(owner.get())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_wallet).collect()
    }

    async fn transactions_of(&self, user: UserId) -> Result<Vec<LedgerTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = $1 ORDER BY id DESC"
        ))
        .bind(user.get())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_transaction).collect()
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_wallet(&mut self, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.as_ref().map(row_to_wallet).transpose()
    }

    async fn lock_user_wallets(&mut self, owner: UserId) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE owner_id = $1 ORDER BY id FOR UPDATE"
        ))
        .bind(owner.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_wallet).collect()
    }

    async fn update_balance(&mut self, id: WalletId, balance: i64) -> Result<()> {
        let result = sqlx::query("UPDATE wallets SET balance = $2 WHERE id = $1")
            .bind(id.get())
            .bind(balance)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(WalletError::wallet_not_found(id));
        }
        Ok(())
    }

    async fn append_transaction(&mut self, record: NewTransaction) -> Result<LedgerTransaction> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (
                user_id, operation, income_wallet, outcome_wallet, income_amount,
                outcome_amount, income_currency, outcome_currency, rate
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, created_at
            "#,
        )
        .bind(record.user_id.get())
        .bind(record.operation.as_str())
        .bind(record.income_wallet.map(|w| w.get()))
        .bind(record.outcome_wallet.map(|w| w.get()))
        .bind(record.income_amount)
        .bind(record.outcome_amount)
        .bind(record.income_currency.map(|c| c.code()))
        .bind(record.outcome_currency.map(|c| c.code()))
        .bind(record.applied_rate)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        let id: i64 = row.try_get("id").map_err(db_error)?;
        let created_at = row.try_get("created_at").map_err(db_error)?;
        Ok(record.into_record(TransactionId::new(id), created_at))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(db_error)
    }
}
