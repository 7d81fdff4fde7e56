//! Wallet records.

use serde::{Deserialize, Serialize};

use crate::{Currency, UserId, WalletError, WalletId};

/// A single-currency wallet owned by one user.
///
/// `balance` is in minor units and never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet identifier.
    pub id: WalletId,
    /// Owning user.
    pub owner: UserId,
    /// Wallet currency.
    pub currency: Currency,
    /// Balance in minor units.
    pub balance: i64,
}

impl Wallet {
    /// Create a wallet record.
    pub fn new(id: WalletId, owner: UserId, currency: Currency, balance: i64) -> Self {
        Self {
            id,
            owner,
            currency,
            balance,
        }
    }

    /// Check if the wallet can cover `amount`.
    pub fn has_sufficient_funds(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// Increase the balance by `amount`.
    pub fn credit(&mut self, amount: i64) -> Result<(), WalletError> {
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(WalletError::InvalidAmount {
                amount,
                reason: "balance overflow",
            })?;
        if balance < 0 {
            return Err(WalletError::NotEnoughMoney {
                wallet_id: self.id,
                balance: self.balance,
                requested: amount.saturating_neg(),
            });
        }
        self.balance = balance;
        Ok(())
    }

    /// Decrease the balance by `amount`, refusing to go below zero.
    pub fn debit(&mut self, amount: i64) -> Result<(), WalletError> {
        if !self.has_sufficient_funds(amount) {
            return Err(WalletError::NotEnoughMoney {
                wallet_id: self.id,
                balance: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(balance: i64) -> Wallet {
        Wallet::new(WalletId::new(1), UserId::new(10), Currency::Usd, balance)
    }

    #[test]
    fn test_debit_and_credit() {
        let mut w = wallet(1_000);

        w.debit(400).unwrap();
        assert_eq!(w.balance, 600);

        w.credit(50).unwrap();
        assert_eq!(w.balance, 650);
    }

    #[test]
    fn test_debit_rejects_overdraft() {
        let mut w = wallet(100);

        let err = w.debit(101).unwrap_err();

        assert!(matches!(err, WalletError::NotEnoughMoney { requested: 101, balance: 100, .. }));
        assert_eq!(w.balance, 100);
    }

    #[test]
    fn test_debit_whole_balance() {
        let mut w = wallet(100);
        w.debit(100).unwrap();
        assert_eq!(w.balance, 0);
    }

    #[test]
    fn test_credit_overflow() {
        let mut w = wallet(i64::MAX);
        assert!(matches!(w.credit(1), Err(WalletError::InvalidAmount { .. })));
        assert_eq!(w.balance, i64::MAX);
    }
}
