//! FxWallet Node
//!
//! Hosts the quote aggregator and the ledger engine behind an exchange desk,
//! and owns their configuration, database connections and lifecycle.

pub mod config;
pub mod database;
pub mod desk;
pub mod node;
pub mod state;

pub use config::NodeConfig;
pub use desk::{ExchangeDesk, ExchangeOrder, ExchangeReceipt};
pub use node::Node;
pub use state::NodeState;
