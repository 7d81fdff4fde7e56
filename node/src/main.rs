//! FxWallet Node Binary
//!
//! Serves exchange rates and wallet operations until interrupted.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxwallet_fx::{HistoryStore, PgHistoryStore, SimulatedRateSource};
use fxwallet_ledger::PgLedgerStore;
use fxwallet_node::{database, Node, NodeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::from_env();

    // Initialize logging
    let filter = config
        .env_filter(std::env::var("RUST_LOG").ok())
        .map_err(anyhow::Error::msg)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(log_level = %config.log_level, "Starting FxWallet node");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let pool = database::connect(&config.database).await.map_err(|e| {
        error!(error = %e, "Database unavailable");
        e
    })?;

    let ledger_store = PgLedgerStore::new(pool.clone());
    ledger_store.migrate().await?;

    let history = PgHistoryStore::new(pool.clone());
    history.migrate().await?;
    let history: Option<Arc<dyn HistoryStore>> = config
        .quotes
        .record_history
        .then(|| Arc::new(history) as Arc<dyn HistoryStore>);

    let node = Node::simulated(
        config.clone(),
        Arc::new(SimulatedRateSource::new()),
        Arc::new(ledger_store),
        history,
    );
    node.start()?;

    info!(
        refresh_interval_secs = config.quotes.refresh_interval.as_secs(),
        currencies = node.desk().currencies().len(),
        "Node running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    node.stop().await;
    database::close(&pool, config.database.connect_timeout).await?;

    info!("Node shutdown complete");
    Ok(())
}
