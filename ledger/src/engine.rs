//! Core ledger engine implementation.

use std::sync::Arc;

use fxwallet_common::{
    exchange_amount, Currency, LedgerTransaction, NewTransaction, Result, UserId, Wallet,
    WalletError, WalletId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::store::{LedgerStore, UnitOfWork};

/// A priced exchange between two wallets of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub user_id: UserId,
    pub from_wallet: WalletId,
    pub to_wallet: WalletId,
    pub from_amount: i64,
    /// Always `floor(from_amount * rate)`.
    pub to_amount: i64,
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub rate: f64,
}

impl ExchangeRequest {
    /// Price an exchange at `rate`, truncating the credited amount.
    pub fn new(
        user_id: UserId,
        from_wallet: WalletId,
        to_wallet: WalletId,
        from_amount: i64,
        from_currency: Currency,
        to_currency: Currency,
        rate: f64,
    ) -> Self {
        Self {
            user_id,
            from_wallet,
            to_wallet,
            from_amount,
            to_amount: exchange_amount(from_amount, rate),
            from_currency,
            to_currency,
            rate,
        }
    }
}

/// The ledger engine owns every balance mutation and every audit row.
///
/// Each operation runs in one unit of work and ends either committed, with
/// its transaction row present, or aborted with nothing written.
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
}

impl LedgerEngine {
    /// Create a ledger engine over a store.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Open a zero-balance wallet.
    #[instrument(skip(self))]
    pub async fn open_wallet(&self, owner: UserId, currency: Currency) -> Result<Wallet> {
        let wallet = self.store.create_wallet(owner, currency).await?;
        info!(wallet_id = %wallet.id, owner = %owner, currency = %currency, "Wallet opened");
        Ok(wallet)
    }

    /// Get a wallet.
    pub async fn wallet(&self, id: WalletId) -> Result<Wallet> {
        self.store
            .wallet(id)
            .await?
            .ok_or_else(|| WalletError::wallet_not_found(id))
    }

    /// Get every wallet of a user.
    pub async fn wallets_of(&self, owner: UserId) -> Result<Vec<Wallet>> {
        self.store.wallets_of(owner).await
    }

    /// Get the audit trail of a user, newest first.
    pub async fn transactions_of(&self, user: UserId) -> Result<Vec<LedgerTransaction>> {
        self.store.transactions_of(user).await
    }

    /// Add `amount` to a wallet.
    #[instrument(skip(self))]
    pub async fn deposit(&self, wallet_id: WalletId, amount: i64) -> Result<Wallet> {
        check_amount(amount)?;

        let mut uow = self.store.begin().await?;
        match apply_deposit(uow.as_mut(), wallet_id, amount).await {
            Ok(wallet) => {
                uow.commit().await?;
                info!(wallet_id = %wallet_id, amount, balance = wallet.balance, "Deposit committed");
                Ok(wallet)
            }
            Err(e) => Err(abort(uow, e).await),
        }
    }

    /// Take `amount` out of a wallet.
    #[instrument(skip(self))]
    pub async fn withdraw(&self, wallet_id: WalletId, amount: i64) -> Result<Wallet> {
        check_amount(amount)?;

        let mut uow = self.store.begin().await?;
        match apply_withdraw(uow.as_mut(), wallet_id, amount).await {
            Ok(wallet) => {
                uow.commit().await?;
                info!(wallet_id = %wallet_id, amount, balance = wallet.balance, "Withdrawal committed");
                Ok(wallet)
            }
            Err(e) => Err(abort(uow, e).await),
        }
    }

    /// Move money between two wallets of the requesting user.
    ///
    /// Returns the source and destination wallets after the exchange.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn exchange(&self, request: &ExchangeRequest) -> Result<(Wallet, Wallet)> {
        check_amount(request.from_amount)?;
        check_amount(request.to_amount)?;

        let mut uow = self.store.begin().await?;
        match apply_exchange(uow.as_mut(), request).await {
            Ok(wallets) => {
                uow.commit().await?;
                info!(
                    from_wallet = %request.from_wallet,
                    to_wallet = %request.to_wallet,
                    from_amount = request.from_amount,
                    to_amount = request.to_amount,
                    rate = request.rate,
                    "Exchange committed"
                );
                Ok(wallets)
            }
            Err(e) => Err(abort(uow, e).await),
        }
    }
}

fn check_amount(amount: i64) -> Result<()> {
    if amount < 0 {
        return Err(WalletError::InvalidAmount {
            amount,
            reason: "amount must not be negative",
        });
    }
    Ok(())
}

/// Roll back and hand the failing error back to the caller.
async fn abort(uow: Box<dyn UnitOfWork>, err: WalletError) -> WalletError {
    debug!(error = %err, "Aborting unit of work");
    if let Err(rollback_err) = uow.rollback().await {
        warn!(error = %rollback_err, "Rollback failed");
    }
    err
}

async fn apply_deposit(uow: &mut dyn UnitOfWork, wallet_id: WalletId, amount: i64) -> Result<Wallet> {
    let mut wallet = uow
        .lock_wallet(wallet_id)
        .await?
        .ok_or_else(|| WalletError::wallet_not_found(wallet_id))?;

    wallet.credit(amount)?;
    uow.update_balance(wallet.id, wallet.balance).await?;
    uow.append_transaction(NewTransaction::deposit(&wallet, amount))
        .await?;

    Ok(wallet)
}

async fn apply_withdraw(uow: &mut dyn UnitOfWork, wallet_id: WalletId, amount: i64) -> Result<Wallet> {
    let mut wallet = uow
        .lock_wallet(wallet_id)
        .await?
        .ok_or_else(|| WalletError::wallet_not_found(wallet_id))?;

    wallet.debit(amount)?;
    uow.update_balance(wallet.id, wallet.balance).await?;
    uow.append_transaction(NewTransaction::withdraw(&wallet, amount))
        .await?;

    Ok(wallet)
}

async fn apply_exchange(
    uow: &mut dyn UnitOfWork,
    request: &ExchangeRequest,
) -> Result<(Wallet, Wallet)> {
    let owned = uow.lock_user_wallets(request.user_id).await?;
    let find = |id: WalletId| {
        owned
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| WalletError::wallet_not_owned(id, request.user_id))
    };

    let mut from = find(request.from_wallet)?;
    let mut to = find(request.to_wallet)?;

    for (wallet, expected) in [(&from, request.from_currency), (&to, request.to_currency)] {
        if wallet.currency != expected {
            return Err(WalletError::CurrencyMismatch {
                wallet_id: wallet.id,
                expected,
                actual: wallet.currency,
            });
        }
    }

    from.debit(request.from_amount)?;
    if from.id == to.id {
        // Same row on both legs: the credit lands on the debited balance.
        to = from.clone();
        to.credit(request.to_amount)?;
        from = to.clone();
        uow.update_balance(to.id, to.balance).await?;
    } else {
        to.credit(request.to_amount)?;
        uow.update_balance(from.id, from.balance).await?;
        uow.update_balance(to.id, to.balance).await?;
    }

    uow.append_transaction(NewTransaction::exchange(
        request.user_id,
        &from,
        &to,
        request.from_amount,
        request.to_amount,
        request.rate,
    ))
    .await?;

    Ok((from, to))
}
