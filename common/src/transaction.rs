//! Ledger transaction (audit trail) records.
//!
//! Exactly one row is written per committed ledger operation. Rows are
//! immutable: nothing updates or deletes them once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Currency, TransactionId, UserId, Wallet, WalletId};

/// Kind of balance-affecting operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Money added to a wallet.
    Deposit,
    /// Money pulled out of a wallet.
    Withdraw,
    /// Money moved between two wallets of one user at a rate.
    Exchange,
}

impl OperationKind {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "DEPOSIT",
            OperationKind::Withdraw => "WITHDRAW",
            OperationKind::Exchange => "EXCHANGE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(OperationKind::Deposit),
            "WITHDRAW" => Ok(OperationKind::Withdraw),
            "EXCHANGE" => Ok(OperationKind::Exchange),
            other => Err(format!("Unknown operation kind: {other}")),
        }
    }
}

/// A transaction row that has not been written yet.
///
/// "Income" is the wallet receiving money, "outcome" the wallet paying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub operation: OperationKind,
    pub income_wallet: Option<WalletId>,
    pub outcome_wallet: Option<WalletId>,
    pub income_amount: i64,
    pub outcome_amount: i64,
    pub income_currency: Option<Currency>,
    pub outcome_currency: Option<Currency>,
    pub applied_rate: Option<f64>,
}

impl NewTransaction {
    /// Row for a deposit into `wallet`.
    pub fn deposit(wallet: &Wallet, amount: i64) -> Self {
        Self {
            user_id: wallet.owner,
            operation: OperationKind::Deposit,
            income_wallet: Some(wallet.id),
            outcome_wallet: None,
            income_amount: amount,
            outcome_amount: 0,
            income_currency: Some(wallet.currency),
            outcome_currency: None,
            applied_rate: None,
        }
    }

    /// Row for a withdrawal from `wallet`.
    pub fn withdraw(wallet: &Wallet, amount: i64) -> Self {
        Self {
            user_id: wallet.owner,
            operation: OperationKind::Withdraw,
            income_wallet: None,
            outcome_wallet: Some(wallet.id),
            income_amount: 0,
            outcome_amount: amount,
            income_currency: None,
            outcome_currency: Some(wallet.currency),
            applied_rate: None,
        }
    }

    /// Row for an exchange recording both legs.
    pub fn exchange(
        user_id: UserId,
        from: &Wallet,
        to: &Wallet,
        from_amount: i64,
        to_amount: i64,
        rate: f64,
    ) -> Self {
        Self {
            user_id,
            operation: OperationKind::Exchange,
            income_wallet: Some(to.id),
            outcome_wallet: Some(from.id),
            income_amount: to_amount,
            outcome_amount: from_amount,
            income_currency: Some(to.currency),
            outcome_currency: Some(from.currency),
            applied_rate: Some(rate),
        }
    }

    /// Attach the store-assigned identity.
    pub fn into_record(self, id: TransactionId, timestamp: DateTime<Utc>) -> LedgerTransaction {
        LedgerTransaction {
            id,
            timestamp,
            user_id: self.user_id,
            operation: self.operation,
            income_wallet: self.income_wallet,
            outcome_wallet: self.outcome_wallet,
            income_amount: self.income_amount,
            outcome_amount: self.outcome_amount,
            income_currency: self.income_currency,
            outcome_currency: self.outcome_currency,
            applied_rate: self.applied_rate,
        }
    }
}

/// A committed ledger transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub user_id: UserId,
    pub operation: OperationKind,
    pub income_wallet: Option<WalletId>,
    pub outcome_wallet: Option<WalletId>,
    pub income_amount: i64,
    pub outcome_amount: i64,
    pub income_currency: Option<Currency>,
    pub outcome_currency: Option<Currency>,
    pub applied_rate: Option<f64>,
}

impl LedgerTransaction {
    /// Signed balance change this row implies for `wallet`.
    pub fn effect_on(&self, wallet: WalletId) -> i64 {
        let mut delta = 0;
        if self.income_wallet == Some(wallet) {
            delta += self.income_amount;
        }
        if self.outcome_wallet == Some(wallet) {
            delta -= self.outcome_amount;
        }
        delta
    }
}
