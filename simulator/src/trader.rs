//! Simulated trader for load testing.

use rand::Rng;

use fxwallet_common::{Currency, Result, UserId, Wallet};
use fxwallet_node::{ExchangeDesk, ExchangeOrder};

/// Currencies every trader holds a wallet in.
pub const TRADED_CURRENCIES: [Currency; 3] = [Currency::Rub, Currency::Usd, Currency::Eur];

/// One random ledger action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Deposit { wallet: usize, amount: i64 },
    Withdraw { wallet: usize, amount: i64 },
    Exchange { from: usize, to: usize, amount: i64 },
}

/// A simulated user with one wallet per traded currency.
pub struct SimulatedTrader {
    /// Trader's user id.
    pub user_id: UserId,
    /// Wallets, in [`TRADED_CURRENCIES`] order.
    wallets: Vec<Wallet>,
}

impl SimulatedTrader {
    /// Open the trader's wallets and fund each with `opening_balance`.
    pub async fn open(desk: &ExchangeDesk, user_id: UserId, opening_balance: i64) -> Result<Self> {
        let mut wallets = Vec::with_capacity(TRADED_CURRENCIES.len());
        for currency in TRADED_CURRENCIES {
            let wallet = desk.ledger().open_wallet(user_id, currency).await?;
            wallets.push(desk.deposit(wallet.id, opening_balance).await?);
        }

        Ok(Self { user_id, wallets })
    }

    /// Pick the next action.
    pub fn next_action(&self, rng: &mut impl Rng) -> Action {
        let count = self.wallets.len();
        match rng.gen_range(0..10) {
            0..=1 => Action::Deposit {
                wallet: rng.gen_range(0..count),
                amount: rng.gen_range(1..10_000),
            },
            2..=3 => Action::Withdraw {
                wallet: rng.gen_range(0..count),
                amount: rng.gen_range(1..20_000),
            },
            _ => {
                let from = rng.gen_range(0..count);
                let to = (from + rng.gen_range(1..count)) % count;
                Action::Exchange {
                    from,
                    to,
                    amount: rng.gen_range(1..50_000),
                }
            }
        }
    }

    /// Run an action against the desk.
    ///
    /// Exchanges quote the rate first and send it along, as a client would.
    pub async fn execute(&self, desk: &ExchangeDesk, action: &Action) -> Result<()> {
        match *action {
            Action::Deposit { wallet, amount } => {
                desk.deposit(self.wallets[wallet].id, amount).await?;
            }
            Action::Withdraw { wallet, amount } => {
                desk.withdraw(self.wallets[wallet].id, amount).await?;
            }
            Action::Exchange { from, to, amount } => {
                let from = &self.wallets[from];
                let to = &self.wallets[to];
                let quoted = desk.quote(from.currency, to.currency)?;

                desk.exchange(&ExchangeOrder {
                    user_id: self.user_id,
                    from_wallet: from.id,
                    to_wallet: to.id,
                    from_currency: from.currency,
                    to_currency: to.currency,
                    amount,
                    quoted_rate: Some(quoted.value),
                })
                .await?;
            }
        }
        Ok(())
    }
}
