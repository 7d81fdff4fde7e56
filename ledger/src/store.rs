//! Storage seam for the ledger engine.
//!
//! A [`LedgerStore`] hands out [`UnitOfWork`]s. Every read and write of one
//! ledger operation goes through a single unit of work, which either commits
//! all of them or none. Wallets read through a unit of work stay locked
//! against other units of work until it ends.

use async_trait::async_trait;
use fxwallet_common::{Currency, LedgerTransaction, NewTransaction, Result, UserId, Wallet, WalletId};

/// An open all-or-nothing scope over the wallet and transaction tables.
///
/// Dropping a unit of work without committing discards its writes.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read a wallet and lock it for the rest of the unit of work.
    async fn lock_wallet(&mut self, id: WalletId) -> Result<Option<Wallet>>;

    /// Read every wallet owned by `owner` and lock them, in id order.
    async fn lock_user_wallets(&mut self, owner: UserId) -> Result<Vec<Wallet>>;

    /// Overwrite a wallet balance.
    async fn update_balance(&mut self, id: WalletId, balance: i64) -> Result<()>;

    /// Append an audit row.
    async fn append_transaction(&mut self, record: NewTransaction) -> Result<LedgerTransaction>;

    /// Make every write visible.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Relational store behind the ledger engine.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Insert a zero-balance wallet.
    async fn create_wallet(&self, owner: UserId, currency: Currency) -> Result<Wallet>;

    /// Read a wallet without locking it.
    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>>;

    /// Every wallet of `owner`, in id order.
    async fn wallets_of(&self, owner: UserId) -> Result<Vec<Wallet>>;

    /// Every transaction of `user`, newest first.
    async fn transactions_of(&self, user: UserId) -> Result<Vec<LedgerTransaction>>;
}
