//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fxwallet_common::{ErrorClass, UserId};
use fxwallet_fx::{HistoryStore, MemoryHistoryStore, SimulatedRateSource};
use fxwallet_ledger::{Fault, IntegrityReport, MemoryLedgerStore};
use fxwallet_node::{Node, NodeConfig};

use crate::metrics::SimulationMetrics;
use crate::trader::SimulatedTrader;

/// Simulation settings.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Number of concurrent traders.
    pub traders: usize,
    /// Opening balance of every trader wallet, in minor units.
    pub opening_balance: i64,
    /// Pause between two actions of one trader.
    pub pace: Duration,
    /// Probability that an action runs with a store fault armed.
    pub fault_rate: f64,
    /// Random seed.
    pub seed: Option<u64>,
    /// Node configuration (quote refresh and feed timings).
    pub node: NodeConfig,
}

/// Final simulation outcome.
#[derive(Debug)]
pub struct SimulationReport {
    pub metrics: SimulationMetrics,
    pub elapsed: Duration,
    pub integrity: Vec<IntegrityReport>,
    pub history_samples: usize,
}

impl SimulationReport {
    /// Whether every trader's ledger replays to its balances.
    pub fn is_consistent(&self) -> bool {
        self.integrity.iter().all(IntegrityReport::is_consistent)
    }
}

/// Controls the simulation.
pub struct SimulationController {
    settings: SimulationSettings,
    store: MemoryLedgerStore,
    history: Arc<MemoryHistoryStore>,
    node: Arc<Node>,
    traders: Vec<Arc<SimulatedTrader>>,
    metrics: Arc<Mutex<SimulationMetrics>>,
}

impl SimulationController {
    /// Create a new simulation controller over in-memory stores.
    pub fn new(settings: SimulationSettings) -> Self {
        let feed = match settings.seed {
            Some(s) => SimulatedRateSource::with_seed(s),
            None => SimulatedRateSource::new(),
        };
        let store = MemoryLedgerStore::new();
        let history = Arc::new(MemoryHistoryStore::new());

        let node = Arc::new(Node::simulated(
            settings.node.clone(),
            Arc::new(feed),
            Arc::new(store.clone()),
            Some(history.clone() as Arc<dyn HistoryStore>),
        ));

        Self {
            settings,
            store,
            history,
            node,
            traders: Vec::new(),
            metrics: Arc::new(Mutex::new(SimulationMetrics::new())),
        }
    }

    /// Start the node and open every trader's wallets.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        info!(traders = self.settings.traders, "Initializing simulation");

        self.node.start()?;

        for i in 0..self.settings.traders {
            let trader = SimulatedTrader::open(
                self.node.desk(),
                UserId::new(i as i64 + 1),
                self.settings.opening_balance,
            )
            .await?;
            self.traders.push(Arc::new(trader));
        }

        Ok(())
    }

    /// Run every trader until `duration` elapses (or Ctrl+C when `None`).
    pub async fn run(&self, duration: Option<Duration>) -> anyhow::Result<SimulationReport> {
        info!("Running simulation");

        let stop = CancellationToken::new();
        let start = Instant::now();
        let base_seed = self.settings.seed.unwrap_or_else(rand::random);

        let mut handles = Vec::with_capacity(self.traders.len());
        for (i, trader) in self.traders.iter().enumerate() {
            let trader = trader.clone();
            let desk = self.node.desk().clone();
            let store = self.store.clone();
            let metrics = self.metrics.clone();
            let stop = stop.clone();
            let pace = self.settings.pace;
            let fault_rate = self.settings.fault_rate;
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(i as u64));

            handles.push(tokio::spawn(async move {
                while !stop.is_cancelled() {
                    let action = trader.next_action(&mut rng);
                    if fault_rate > 0.0 && rng.gen_bool(fault_rate) {
                        store.inject_fault(Fault::BalanceUpdate { nth: 1 });
                    }

                    let started = Instant::now();
                    let result = trader.execute(&desk, &action).await;
                    let latency_us = started.elapsed().as_micros() as u64;

                    match result {
                        Ok(()) => metrics.lock().record_success(latency_us),
                        Err(e) if e.class() == ErrorClass::Conflict => {
                            metrics.lock().record_rejection()
                        }
                        Err(e) => {
                            warn!(user_id = %trader.user_id, error = %e, "Operation failed");
                            metrics.lock().record_failure();
                        }
                    }

                    tokio::select! {
                        () = stop.cancelled() => break,
                        () = tokio::time::sleep(pace) => {}
                    }
                }
            }));
        }

        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => tokio::signal::ctrl_c().await?,
        }

        stop.cancel();
        for handle in handles {
            handle.await?;
        }
        let elapsed = start.elapsed();
        self.node.stop().await;

        let mut integrity = Vec::with_capacity(self.traders.len());
        for trader in &self.traders {
            integrity.push(self.node.desk().ledger().verify_integrity(trader.user_id).await?);
        }

        Ok(SimulationReport {
            metrics: self.get_metrics(),
            elapsed,
            integrity,
            history_samples: self.history.len(),
        })
    }

    /// Get simulation metrics.
    pub fn get_metrics(&self) -> SimulationMetrics {
        self.metrics.lock().clone()
    }
}
