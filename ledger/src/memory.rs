//! Process-local ledger store.
//!
//! A unit of work holds the store lock from `begin` until it ends and works
//! on a private copy of the state, so units of work are fully serialised and
//! an aborted one leaves nothing behind. Faults can be injected to exercise
//! rollback paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fxwallet_common::{
    Currency, LedgerTransaction, NewTransaction, Result, TransactionId, UserId, Wallet, WalletError,
    WalletId,
};
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::store::{LedgerStore, UnitOfWork};

/// Store fault armed for the next unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Refuse to open the unit of work.
    Begin,
    /// Fail the `nth` balance update (1-based).
    BalanceUpdate { nth: usize },
    /// Fail the audit row insert.
    AppendTransaction,
    /// Fail at commit; nothing becomes visible.
    Commit,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    wallets: BTreeMap<WalletId, Wallet>,
    transactions: Vec<LedgerTransaction>,
    next_wallet_id: i64,
    next_transaction_id: i64,
}

impl LedgerState {
    fn insert_wallet(&mut self, owner: UserId, currency: Currency, balance: i64) -> Wallet {
        self.next_wallet_id += 1;
        let wallet = Wallet::new(WalletId::new(self.next_wallet_id), owner, currency, balance);
        self.wallets.insert(wallet.id, wallet.clone());
        wallet
    }

    fn wallets_of(&self, owner: UserId) -> Vec<Wallet> {
        self.wallets
            .values()
            .filter(|w| w.owner == owner)
            .cloned()
            .collect()
    }
}

/// In-memory [`LedgerStore`] with serialisable units of work.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<tokio::sync::Mutex<LedgerState>>,
    fault: Arc<Mutex<Option<Fault>>>,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a wallet with an opening balance, bypassing the ledger.
    pub async fn seed_wallet(&self, owner: UserId, currency: Currency, balance: i64) -> Wallet {
        self.state.lock().await.insert_wallet(owner, currency, balance)
    }

    /// Arm a fault for the next unit of work.
    pub fn inject_fault(&self, fault: Fault) {
        *self.fault.lock() = Some(fault);
    }

    /// Number of committed transaction rows.
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let fault = self.fault.lock().take();
        if fault == Some(Fault::Begin) {
            return Err(WalletError::Database("injected fault: begin".to_string()));
        }

        let guard = self.state.clone().lock_owned().await;
        let staged = (*guard).clone();

        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            fault,
            balance_updates: 0,
        }))
    }

    async fn create_wallet(&self, owner: UserId, currency: Currency) -> Result<Wallet> {
        Ok(self.state.lock().await.insert_wallet(owner, currency, 0))
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(&id).cloned())
    }

    async fn wallets_of(&self, owner: UserId) -> Result<Vec<Wallet>> {
        Ok(self.state.lock().await.wallets_of(owner))
    }

    async fn transactions_of(&self, user: UserId) -> Result<Vec<LedgerTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user)
            .cloned()
            .collect())
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
    fault: Option<Fault>,
    balance_updates: usize,
}

impl MemoryUnitOfWork {
    fn injected(what: &str) -> WalletError {
        WalletError::Database(format!("injected fault: {what}"))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_wallet(&mut self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.staged.wallets.get(&id).cloned())
    }

    async fn lock_user_wallets(&mut self, owner: UserId) -> Result<Vec<Wallet>> {
        Ok(self.staged.wallets_of(owner))
    }

    async fn update_balance(&mut self, id: WalletId, balance: i64) -> Result<()> {
        self.balance_updates += 1;
        if self.fault == Some(Fault::BalanceUpdate { nth: self.balance_updates }) {
            return Err(Self::injected("balance update"));
        }
        if balance < 0 {
            return Err(WalletError::Database(format!(
                "balance check violated for wallet {id}"
            )));
        }

        let wallet = self
            .staged
            .wallets
            .get_mut(&id)
            .ok_or_else(|| WalletError::wallet_not_found(id))?;
        wallet.balance = balance;
        Ok(())
    }

    async fn append_transaction(&mut self, record: NewTransaction) -> Result<LedgerTransaction> {
        if self.fault == Some(Fault::AppendTransaction) {
            return Err(Self::injected("append transaction"));
        }

        self.staged.next_transaction_id += 1;
        let row = record.into_record(
            TransactionId::new(self.staged.next_transaction_id),
            Utc::now(),
        );
        self.staged.transactions.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fault == Some(Fault::Commit) {
            return Err(Self::injected("commit"));
        }

        let MemoryUnitOfWork {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryLedgerStore::new();
        let wallet = store.seed_wallet(UserId::new(1), Currency::Usd, 100).await;

        let mut uow = store.begin().await.unwrap();
        uow.update_balance(wallet.id, 50).await.unwrap();
        uow.rollback().await.unwrap();

        assert_eq!(store.wallet(wallet.id).await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes() {
        let store = MemoryLedgerStore::new();
        let wallet = store.seed_wallet(UserId::new(1), Currency::Usd, 100).await;

        {
            let mut uow = store.begin().await.unwrap();
            uow.update_balance(wallet.id, 0).await.unwrap();
        }

        assert_eq!(store.wallet(wallet.id).await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryLedgerStore::new();
        let wallet = store.seed_wallet(UserId::new(1), Currency::Usd, 100).await;

        let mut uow = store.begin().await.unwrap();
        uow.update_balance(wallet.id, 75).await.unwrap();
        uow.append_transaction(NewTransaction::withdraw(&wallet, 25))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.wallet(wallet.id).await.unwrap().unwrap().balance, 75);
        assert_eq!(store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_fault_applies_to_next_unit_only() {
        let store = MemoryLedgerStore::new();
        let wallet = store.seed_wallet(UserId::new(1), Currency::Usd, 100).await;
        store.inject_fault(Fault::BalanceUpdate { nth: 1 });

        let mut uow = store.begin().await.unwrap();
        assert!(uow.update_balance(wallet.id, 10).await.is_err());
        drop(uow);

        let mut uow = store.begin().await.unwrap();
        tokio_test::assert_ok!(uow.update_balance(wallet.id, 10).await);
    }

    #[tokio::test]
    async fn test_negative_balance_is_refused() {
        let store = MemoryLedgerStore::new();
        let wallet = store.seed_wallet(UserId::new(1), Currency::Usd, 100).await;

        let mut uow = store.begin().await.unwrap();

        assert!(matches!(
            uow.update_balance(wallet.id, -1).await,
            Err(WalletError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_wallet_ids_and_listing() {
        let store = MemoryLedgerStore::new();
        let a = store.create_wallet(UserId::new(1), Currency::Rub).await.unwrap();
        let b = store.create_wallet(UserId::new(2), Currency::Usd).await.unwrap();
        let c = store.create_wallet(UserId::new(1), Currency::Eur).await.unwrap();

        assert!(a.id < b.id && b.id < c.id);
        let owned: Vec<_> = store
            .wallets_of(UserId::new(1))
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(owned, vec![a.id, c.id]);
    }
}
