//! Service node: wires the quote feed, aggregator, ledger and desk together
//! and owns their background tasks.

use std::sync::Arc;

use fxwallet_common::{Result, WalletError};
use fxwallet_fx::{AggregatorConfig, HistoryStore, QuoteAggregator, RateSource, SimulatedRateSource};
use fxwallet_ledger::{LedgerEngine, LedgerStore};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::NodeConfig;
use crate::desk::ExchangeDesk;
use crate::state::NodeState;

/// A running FxWallet service.
pub struct Node {
    config: NodeConfig,
    state: Arc<RwLock<NodeState>>,
    drift: Option<Arc<SimulatedRateSource>>,
    aggregator: Arc<QuoteAggregator>,
    desk: Arc<ExchangeDesk>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Wire a node that quotes from `source`. Nothing runs until [`Node::start`].
    pub fn new(
        config: NodeConfig,
        source: Arc<dyn RateSource>,
        store: Arc<dyn LedgerStore>,
        history: Option<Arc<dyn HistoryStore>>,
    ) -> Self {
        let aggregator = Arc::new(QuoteAggregator::new(
            source,
            history,
            AggregatorConfig {
                refresh_interval: config.quotes.refresh_interval,
                record_history: config.quotes.record_history,
                ..AggregatorConfig::default()
            },
        ));
        let ledger = Arc::new(LedgerEngine::new(store));
        let state = Arc::new(RwLock::new(NodeState::Starting));
        let desk = Arc::new(ExchangeDesk::new(
            aggregator.clone(),
            ledger,
            state.clone(),
            config.quotes.rate_tolerance,
            config.operation_timeout,
        ));

        Self {
            config,
            state,
            drift: None,
            aggregator,
            desk,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Wire a node over the simulated feed, which drifts every
    /// `quotes.feed_step` while the node runs.
    pub fn simulated(
        config: NodeConfig,
        feed: Arc<SimulatedRateSource>,
        store: Arc<dyn LedgerStore>,
        history: Option<Arc<dyn HistoryStore>>,
    ) -> Self {
        let mut node = Self::new(config, feed.clone(), store, history);
        node.drift = Some(feed);
        node
    }

    /// Start the feed drift (if any) and the quote refresh loop.
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<()> {
        if *self.state.read() != NodeState::Starting {
            return Err(WalletError::Configuration("node already started".to_string()));
        }

        info!("Starting node");

        let refresh = self
            .aggregator
            .start(self.shutdown.child_token())
            .map_err(|e| WalletError::Configuration(e.to_string()))?;

        let mut tasks = self.tasks.lock();
        tasks.push(refresh);
        if let Some(feed) = &self.drift {
            tasks.push(feed.spawn_drift(self.config.quotes.feed_step, self.shutdown.child_token()));
        }
        drop(tasks);
        *self.state.write() = NodeState::Running;

        info!("Node running");
        Ok(())
    }

    /// Cancel every background task and wait for it to exit.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, NodeState::ShuttingDown | NodeState::Stopped) {
                return;
            }
            *state = NodeState::ShuttingDown;
        }

        info!("Stopping node");
        self.shutdown.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        *self.state.write() = NodeState::Stopped;
        info!("Node stopped");
    }

    /// Current state.
    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    /// Request-facing desk.
    pub fn desk(&self) -> &Arc<ExchangeDesk> {
        &self.desk
    }

    /// Quote aggregator.
    pub fn aggregator(&self) -> &Arc<QuoteAggregator> {
        &self.aggregator
    }

    /// Resolves once shutdown has been requested.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxwallet_common::{Currency, UserId};
    use fxwallet_fx::{MemoryHistoryStore, MockRateSource};
    use fxwallet_ledger::MemoryLedgerStore;
    use std::time::Duration;

    fn node(history: Option<Arc<dyn HistoryStore>>) -> Node {
        let mut config = NodeConfig::default();
        config.quotes.feed_step = Duration::from_secs(3600);
        config.quotes.refresh_interval = Duration::from_secs(3600);

        Node::simulated(
            config,
            Arc::new(SimulatedRateSource::with_seed(7)),
            Arc::new(MemoryLedgerStore::new()),
            history,
        )
    }

    async fn wait_for_rate(node: &Node, from: Currency, to: Currency) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while node.desk().quote(from, to).is_err() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let node = node(None);
        assert_eq!(node.state(), NodeState::Starting);

        node.start().unwrap();
        assert_eq!(node.state(), NodeState::Running);
        assert!(node.start().is_err());

        node.stop().await;
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(node.shutdown_token().is_cancelled());

        node.stop().await;
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[tokio::test]
    async fn test_first_refresh_serves_seeded_quotes() {
        let history = Arc::new(MemoryHistoryStore::new());
        let node = node(Some(history.clone()));
        node.start().unwrap();

        wait_for_rate(&node, Currency::Usd, Currency::Rub).await;
        let entry = node.desk().quote(Currency::Usd, Currency::Rub).unwrap();
        assert_eq!(entry.value, 60.85);
        assert!(entry.is_increasing);

        node.stop().await;
        assert!(!history.is_empty());
    }

    #[tokio::test]
    async fn test_exchange_through_node() {
        let node = node(None);
        node.start().unwrap();
        wait_for_rate(&node, Currency::Usd, Currency::Rub).await;

        let ledger = node.desk().ledger();
        let user = UserId::new(3);
        let usd = ledger.open_wallet(user, Currency::Usd).await.unwrap();
        let rub = ledger.open_wallet(user, Currency::Rub).await.unwrap();
        node.desk().deposit(usd.id, 1_000).await.unwrap();

        let receipt = node
            .desk()
            .exchange(&crate::desk::ExchangeOrder {
                user_id: user,
                from_wallet: usd.id,
                to_wallet: rub.id,
                from_currency: Currency::Usd,
                to_currency: Currency::Rub,
                amount: 100,
                quoted_rate: None,
            })
            .await
            .unwrap();

        assert_eq!(receipt.to_amount, 6_085);
        assert_eq!(ledger.verify_integrity(user).await.unwrap().mismatches, vec![]);

        node.stop().await;
    }

    #[tokio::test]
    async fn test_requests_refused_after_stop() {
        let node = node(None);
        node.start().unwrap();
        wait_for_rate(&node, Currency::Usd, Currency::Rub).await;

        let ledger = node.desk().ledger();
        let user = UserId::new(4);
        let usd = ledger.open_wallet(user, Currency::Usd).await.unwrap();
        let rub = ledger.open_wallet(user, Currency::Rub).await.unwrap();
        node.desk().deposit(usd.id, 1_000).await.unwrap();

        node.stop().await;
        assert_eq!(node.state(), NodeState::Stopped);

        let deposit = node.desk().deposit(usd.id, 500).await;
        let exchange = node
            .desk()
            .exchange(&crate::desk::ExchangeOrder {
                user_id: user,
                from_wallet: usd.id,
                to_wallet: rub.id,
                from_currency: Currency::Usd,
                to_currency: Currency::Rub,
                amount: 100,
                quoted_rate: None,
            })
            .await;

        assert!(matches!(deposit, Err(WalletError::Unavailable(_))));
        assert!(matches!(exchange, Err(WalletError::Unavailable(_))));
        assert_eq!(ledger.wallet(usd.id).await.unwrap().balance, 1_000);
        assert_eq!(ledger.wallet(rub.id).await.unwrap().balance, 0);
        assert_eq!(ledger.transactions_of(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_node_over_external_source() {
        let source = Arc::new(MockRateSource::new("external"));
        source.set_rate(Currency::Eur, Currency::Usd, 1.08);

        let mut config = NodeConfig::default();
        config.quotes.refresh_interval = Duration::from_secs(3600);
        let node = Node::new(
            config,
            source.clone(),
            Arc::new(MemoryLedgerStore::new()),
            None,
        );

        node.start().unwrap();
        wait_for_rate(&node, Currency::Eur, Currency::Usd).await;
        assert_eq!(node.desk().quote(Currency::Eur, Currency::Usd).unwrap().value, 1.08);

        node.stop().await;
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(source.calls() > 0);
    }
}
