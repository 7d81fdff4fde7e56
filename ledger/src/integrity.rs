//! Audit trail replay.
//!
//! Every balance change goes through a transaction row, so replaying a
//! user's rows from zero must reproduce every wallet balance. Run it while
//! the user has no operations in flight.

use std::collections::HashMap;

use fxwallet_common::{Result, UserId, WalletId};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::engine::LedgerEngine;

/// A wallet whose stored balance disagrees with its audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub wallet_id: WalletId,
    pub stored: i64,
    pub replayed: i64,
}

/// Result of replaying one user's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub owner: UserId,
    pub wallets_checked: usize,
    pub transactions_replayed: usize,
    pub mismatches: Vec<BalanceMismatch>,
}

impl IntegrityReport {
    /// Whether every balance matched.
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl LedgerEngine {
    /// Replay the audit trail of `owner` and compare it with stored balances.
    #[instrument(skip(self))]
    pub async fn verify_integrity(&self, owner: UserId) -> Result<IntegrityReport> {
        let wallets = self.wallets_of(owner).await?;
        let transactions = self.transactions_of(owner).await?;

        let mut replayed: HashMap<WalletId, i64> =
            wallets.iter().map(|w| (w.id, 0)).collect();
        for row in &transactions {
            for (wallet_id, sum) in replayed.iter_mut() {
                *sum += row.effect_on(*wallet_id);
            }
        }

        let mismatches: Vec<BalanceMismatch> = wallets
            .iter()
            .filter_map(|w| {
                let sum = replayed.get(&w.id).copied().unwrap_or_default();
                (sum != w.balance).then(|| BalanceMismatch {
                    wallet_id: w.id,
                    stored: w.balance,
                    replayed: sum,
                })
            })
            .collect();

        let report = IntegrityReport {
            owner,
            wallets_checked: wallets.len(),
            transactions_replayed: transactions.len(),
            mismatches,
        };

        if report.is_consistent() {
            info!(
                owner = %owner,
                wallets = report.wallets_checked,
                transactions = report.transactions_replayed,
                "Ledger consistent"
            );
        } else {
            warn!(
                owner = %owner,
                mismatches = report.mismatches.len(),
                "Ledger balances disagree with audit trail"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExchangeRequest;
    use crate::memory::MemoryLedgerStore;
    use fxwallet_common::{Currency, WalletError};
    use proptest::prelude::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_seeded_balance_is_reported() {
        let store = MemoryLedgerStore::new();
        let engine = LedgerEngine::new(Arc::new(store.clone()));
        let owner = UserId::new(7);

        let clean = engine.open_wallet(owner, Currency::Usd).await.unwrap();
        engine.deposit(clean.id, 500).await.unwrap();
        let seeded = store.seed_wallet(owner, Currency::Eur, 40).await;

        let report = engine.verify_integrity(owner).await.unwrap();

        assert!(!report.is_consistent());
        assert_eq!(report.wallets_checked, 2);
        assert_eq!(
            report.mismatches,
            vec![BalanceMismatch {
                wallet_id: seeded.id,
                stored: 40,
                replayed: 0,
            }]
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(usize, i64),
        Withdraw(usize, i64),
        Exchange(usize, usize, i64, f64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 0i64..10_000).prop_map(|(w, a)| Op::Deposit(w, a)),
            (0usize..3, 0i64..10_000).prop_map(|(w, a)| Op::Withdraw(w, a)),
            (0usize..3, 0usize..3, 0i64..10_000, 0.001f64..100.0)
                .prop_map(|(f, t, a, r)| Op::Exchange(f, t, a, r)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_replay_matches_balances(ops in prop::collection::vec(op(), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();

            runtime.block_on(async {
                let engine = LedgerEngine::new(Arc::new(MemoryLedgerStore::new()));
                let owner = UserId::new(1);
                let mut wallets = Vec::new();
                for currency in [Currency::Rub, Currency::Usd, Currency::Eur] {
                    wallets.push(engine.open_wallet(owner, currency).await.unwrap());
                }

                for op in ops {
                    let result = match op {
                        Op::Deposit(w, a) => engine.deposit(wallets[w].id, a).await.map(|_| ()),
                        Op::Withdraw(w, a) => engine.withdraw(wallets[w].id, a).await.map(|_| ()),
                        Op::Exchange(f, t, a, r) => {
                            let request = ExchangeRequest::new(
                                owner,
                                wallets[f].id,
                                wallets[t].id,
                                a,
                                wallets[f].currency,
                                wallets[t].currency,
                                r,
                            );
                            engine.exchange(&request).await.map(|_| ())
                        }
                    };
                    match result {
                        Ok(()) | Err(WalletError::NotEnoughMoney { .. }) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }

                let report = engine.verify_integrity(owner).await.unwrap();
                assert!(report.is_consistent(), "{report:?}");
                for wallet in engine.wallets_of(owner).await.unwrap() {
                    assert!(wallet.balance >= 0);
                }
            });
        }
    }
}
