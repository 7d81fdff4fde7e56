//! FxWallet Ledger Engine
//!
//! Atomic deposit, withdraw and exchange over wallet balances, with one
//! immutable audit row per committed operation.

pub mod engine;
pub mod integrity;
pub mod memory;
pub mod postgres;
pub mod store;

pub use engine::{ExchangeRequest, LedgerEngine};
pub use integrity::{BalanceMismatch, IntegrityReport};
pub use memory::{Fault, MemoryLedgerStore};
pub use postgres::PgLedgerStore;
pub use store::{LedgerStore, UnitOfWork};
