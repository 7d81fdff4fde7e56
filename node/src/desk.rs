//! Exchange desk: prices requests against the live quote table and hands
//! them to the ledger under the operation deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fxwallet_common::{Currency, Result, UserId, Wallet, WalletError, WalletId};
use fxwallet_fx::{QuoteAggregator, RateEntry};
use fxwallet_ledger::{ExchangeRequest, LedgerEngine};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::state::NodeState;

/// A client request to exchange money between two of its wallets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub user_id: UserId,
    pub from_wallet: WalletId,
    pub to_wallet: WalletId,
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub amount: i64,
    /// Rate the client saw when placing the order, if any.
    pub quoted_rate: Option<f64>,
}

/// Outcome of a committed exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeReceipt {
    pub from: Wallet,
    pub to: Wallet,
    pub rate: f64,
    pub from_amount: i64,
    pub to_amount: i64,
}

/// Request-facing pricing and ledger access.
///
/// Ledger writes are only served while the shared node state accepts
/// requests; otherwise they fail with `Unavailable` before touching the store.
pub struct ExchangeDesk {
    aggregator: Arc<QuoteAggregator>,
    ledger: Arc<LedgerEngine>,
    state: Arc<RwLock<NodeState>>,
    rate_tolerance: f64,
    operation_timeout: Duration,
}

impl ExchangeDesk {
    /// Create a desk over a running aggregator and a ledger, gated on `state`.
    pub fn new(
        aggregator: Arc<QuoteAggregator>,
        ledger: Arc<LedgerEngine>,
        state: Arc<RwLock<NodeState>>,
        rate_tolerance: f64,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            aggregator,
            ledger,
            state,
            rate_tolerance,
            operation_timeout,
        }
    }

    /// Every supported currency.
    pub fn currencies(&self) -> &'static [Currency] {
        &Currency::ALL
    }

    /// Current rate for the pair, or `RateUnknown` before its first refresh.
    pub fn quote(&self, from: Currency, to: Currency) -> Result<RateEntry> {
        let entry = self.aggregator.get_rate(from, to);
        if !entry.is_known() {
            return Err(WalletError::RateUnknown { from, to });
        }
        Ok(entry)
    }

    /// Current rates of every currency tracked against `base`.
    pub fn quotes(&self, base: Currency) -> Vec<(Currency, RateEntry)> {
        self.aggregator.table().snapshot(base)
    }

    /// Price and execute an exchange.
    #[instrument(skip(self, order), fields(user_id = %order.user_id))]
    pub async fn exchange(&self, order: &ExchangeOrder) -> Result<ExchangeReceipt> {
        self.ensure_accepting("exchange")?;
        let current = self.quote(order.from_currency, order.to_currency)?;

        if let Some(quoted) = order.quoted_rate {
            if (quoted - current.value).abs() > self.rate_tolerance {
                debug!(quoted, current = current.value, "Quoted rate is stale");
                return Err(WalletError::RateChanged {
                    from: order.from_currency,
                    to: order.to_currency,
                    quoted,
                    current: current.value,
                });
            }
        }

        let request = ExchangeRequest::new(
            order.user_id,
            order.from_wallet,
            order.to_wallet,
            order.amount,
            order.from_currency,
            order.to_currency,
            current.value,
        );

        let (from, to) = self
            .with_deadline("exchange", self.ledger.exchange(&request))
            .await?;

        info!(
            from_currency = %order.from_currency,
            to_currency = %order.to_currency,
            rate = current.value,
            to_amount = request.to_amount,
            "Exchange priced and settled"
        );

        Ok(ExchangeReceipt {
            from,
            to,
            rate: current.value,
            from_amount: request.from_amount,
            to_amount: request.to_amount,
        })
    }

    /// Deposit under the operation deadline.
    pub async fn deposit(&self, wallet_id: WalletId, amount: i64) -> Result<Wallet> {
        self.ensure_accepting("deposit")?;
        self.with_deadline("deposit", self.ledger.deposit(wallet_id, amount))
            .await
    }

    /// Withdraw under the operation deadline.
    pub async fn withdraw(&self, wallet_id: WalletId, amount: i64) -> Result<Wallet> {
        self.ensure_accepting("withdraw")?;
        self.with_deadline("withdraw", self.ledger.withdraw(wallet_id, amount))
            .await
    }

    /// The ledger behind the desk.
    pub fn ledger(&self) -> &Arc<LedgerEngine> {
        &self.ledger
    }

    fn ensure_accepting(&self, operation: &str) -> Result<()> {
        let state = *self.state.read();
        if !state.accepts_requests() {
            debug!(operation, ?state, "Refusing request");
            return Err(WalletError::Unavailable(format!(
                "{operation} refused, node is {state:?}"
            )));
        }
        Ok(())
    }

    // A unit of work dropped at the deadline is rolled back by its store.
    async fn with_deadline<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| {
                WalletError::Timeout(format!(
                    "{operation} exceeded {:?}",
                    self.operation_timeout
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxwallet_fx::{AggregatorConfig, MockRateSource};
    use fxwallet_ledger::MemoryLedgerStore;

    const USER: UserId = UserId::new(1);

    struct Fixture {
        source: Arc<MockRateSource>,
        aggregator: Arc<QuoteAggregator>,
        state: Arc<RwLock<NodeState>>,
        desk: ExchangeDesk,
    }

    async fn fixture() -> Fixture {
        let source = Arc::new(MockRateSource::new("mock"));
        source.set_rate(Currency::Rub, Currency::Usd, 0.016);
        source.set_rate(Currency::Usd, Currency::Rub, 60.85);

        let aggregator = Arc::new(QuoteAggregator::new(
            source.clone(),
            None,
            AggregatorConfig {
                bases: vec![Currency::Rub, Currency::Usd],
                record_history: false,
                ..AggregatorConfig::default()
            },
        ));
        aggregator.refresh().await;

        let ledger = Arc::new(LedgerEngine::new(Arc::new(MemoryLedgerStore::new())));
        let state = Arc::new(RwLock::new(NodeState::Running));
        let desk = ExchangeDesk::new(
            aggregator.clone(),
            ledger,
            state.clone(),
            0.00001,
            Duration::from_secs(2),
        );

        Fixture {
            source,
            aggregator,
            state,
            desk,
        }
    }

    async fn wallets(desk: &ExchangeDesk) -> (Wallet, Wallet) {
        let ledger = desk.ledger();
        let rub = ledger.open_wallet(USER, Currency::Rub).await.unwrap();
        let usd = ledger.open_wallet(USER, Currency::Usd).await.unwrap();
        desk.deposit(rub.id, 100_000).await.unwrap();
        (rub, usd)
    }

    fn order(from: &Wallet, to: &Wallet, amount: i64, quoted_rate: Option<f64>) -> ExchangeOrder {
        ExchangeOrder {
            user_id: USER,
            from_wallet: from.id,
            to_wallet: to.id,
            from_currency: from.currency,
            to_currency: to.currency,
            amount,
            quoted_rate,
        }
    }

    #[tokio::test]
    async fn test_exchange_at_current_rate() {
        let f = fixture().await;
        let (rub, usd) = wallets(&f.desk).await;

        let receipt = f
            .desk
            .exchange(&order(&rub, &usd, 10_000, Some(0.016)))
            .await
            .unwrap();

        assert_eq!(receipt.rate, 0.016);
        assert_eq!(receipt.to_amount, 160);
        assert_eq!(receipt.from.balance, 90_000);
        assert_eq!(receipt.to.balance, 160);
    }

    #[tokio::test]
    async fn test_stale_quote_rejected() {
        let f = fixture().await;
        let (rub, usd) = wallets(&f.desk).await;

        f.source.set_rate(Currency::Rub, Currency::Usd, 0.017);
        f.aggregator.refresh().await;

        let result = f.desk.exchange(&order(&rub, &usd, 10_000, Some(0.016))).await;

        assert!(matches!(result, Err(WalletError::RateChanged { current, .. }) if current == 0.017));
        assert_eq!(f.desk.ledger().wallet(rub.id).await.unwrap().balance, 100_000);
    }

    #[tokio::test]
    async fn test_quote_within_tolerance_accepted() {
        let f = fixture().await;
        let (rub, usd) = wallets(&f.desk).await;

        let receipt = f
            .desk
            .exchange(&order(&rub, &usd, 1_000, Some(0.016005)))
            .await
            .unwrap();

        assert_eq!(receipt.rate, 0.016);
    }

    #[tokio::test]
    async fn test_unknown_rate() {
        let f = fixture().await;
        let ledger = f.desk.ledger();
        let eur = ledger.open_wallet(USER, Currency::Eur).await.unwrap();
        let usd = ledger.open_wallet(USER, Currency::Usd).await.unwrap();

        let result = f.desk.exchange(&order(&eur, &usd, 10, None)).await;

        assert_eq!(
            result,
            Err(WalletError::RateUnknown {
                from: Currency::Eur,
                to: Currency::Usd,
            })
        );
    }

    #[tokio::test]
    async fn test_currencies_and_quotes() {
        let f = fixture().await;

        assert_eq!(f.desk.currencies().len(), 7);
        let usd_quotes = f.desk.quotes(Currency::Usd);
        assert!(usd_quotes
            .iter()
            .any(|(c, e)| *c == Currency::Rub && e.value == 60.85));
    }

    #[tokio::test]
    async fn test_ledger_deadline() {
        let f = fixture().await;
        let desk = ExchangeDesk::new(
            f.aggregator.clone(),
            f.desk.ledger().clone(),
            f.state.clone(),
            0.00001,
            Duration::from_millis(50),
        );

        let result = desk
            .with_deadline("slow", async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(WalletError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_writes_refused_unless_running() {
        let f = fixture().await;
        let (rub, usd) = wallets(&f.desk).await;

        for state in [NodeState::Starting, NodeState::ShuttingDown, NodeState::Stopped] {
            *f.state.write() = state;

            let deposit = f.desk.deposit(rub.id, 10).await;
            let withdraw = f.desk.withdraw(rub.id, 10).await;
            let exchange = f.desk.exchange(&order(&rub, &usd, 1_000, None)).await;

            assert!(matches!(deposit, Err(WalletError::Unavailable(_))));
            assert!(matches!(withdraw, Err(WalletError::Unavailable(_))));
            assert!(matches!(exchange, Err(WalletError::Unavailable(_))));
        }

        assert_eq!(f.desk.ledger().wallet(rub.id).await.unwrap().balance, 100_000);
        assert_eq!(f.desk.ledger().wallet(usd.id).await.unwrap().balance, 0);
        assert!(f.desk.quote(Currency::Rub, Currency::Usd).is_ok());
    }
}
