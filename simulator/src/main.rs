//! FxWallet Simulator
//!
//! Drives concurrent traders through the exchange desk against in-memory
//! stores while the quote feed moves, then replays every trader's ledger.

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod trader;

use controller::{SimulationController, SimulationSettings};
use fxwallet_node::NodeConfig;

/// FxWallet Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "FxWallet load simulator")]
struct Args {
    /// Number of simulated traders
    #[arg(short, long, default_value = "8")]
    traders: usize,

    /// Opening balance of every wallet, in minor units
    #[arg(long, default_value = "1000000")]
    opening_balance: i64,

    /// Pause between two actions of one trader (ms)
    #[arg(long, default_value = "5")]
    pace_ms: u64,

    /// Quote table refresh interval (ms)
    #[arg(long, default_value = "500")]
    refresh_ms: u64,

    /// Simulated feed step (ms)
    #[arg(long, default_value = "200")]
    feed_step_ms: u64,

    /// Probability of arming a store fault before an action
    #[arg(long, default_value = "0.0")]
    fault_rate: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Run duration in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "10")]
    duration: u64,

    /// Print the final metrics as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,simulator=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.fault_rate) {
        anyhow::bail!("fault rate must be within 0..=1, got {}", args.fault_rate);
    }

    let mut node = NodeConfig::default();
    node.quotes.refresh_interval = Duration::from_millis(args.refresh_ms);
    node.quotes.feed_step = Duration::from_millis(args.feed_step_ms);

    info!(traders = args.traders, fault_rate = args.fault_rate, "Starting FxWallet Simulator");

    let mut controller = SimulationController::new(SimulationSettings {
        traders: args.traders,
        opening_balance: args.opening_balance,
        pace: Duration::from_millis(args.pace_ms),
        fault_rate: args.fault_rate,
        seed: args.seed,
        node,
    });
    controller.initialize().await?;

    let duration = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    if duration.is_none() {
        info!("Press Ctrl+C to stop");
    }

    let report = controller.run(duration).await?;
    let metrics = &report.metrics;

    if args.json {
        println!("{}", serde_json::to_string_pretty(metrics)?);
    }

    info!("Simulation complete");
    info!("Total operations: {}", metrics.total_operations);
    info!("Successful: {}", metrics.successful_operations);
    info!("Rejected: {}", metrics.rejected_operations);
    info!("Failed: {}", metrics.failed_operations);
    info!(
        "Latency avg/p50/p99: {}/{}/{} us",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );
    info!("Success rate: {:.1}%", metrics.success_rate() * 100.0);
    info!(
        "Throughput: {:.0} ops/s",
        metrics.throughput(report.elapsed.as_secs_f64())
    );
    info!("Rate samples recorded: {}", report.history_samples);

    if !report.is_consistent() {
        for mismatch in report.integrity.iter().flat_map(|r| &r.mismatches) {
            error!(
                wallet_id = %mismatch.wallet_id,
                stored = mismatch.stored,
                replayed = mismatch.replayed,
                "Balance does not match audit trail"
            );
        }
        anyhow::bail!("ledger integrity check failed");
    }

    info!("Ledger integrity verified for {} traders", report.integrity.len());
    Ok(())
}
