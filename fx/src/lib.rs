//! FxWallet Quote Aggregator
//!
//! Keeps an in-memory table of cross-currency rates fresh by polling a rate
//! source on a fixed interval, and tracks whether each rate rose on its last
//! refresh.
//!
//! # Features
//!
//! - Concurrent per-pair refresh with fan-out/fan-in per cycle
//! - Non-blocking reads that never touch the rate source
//! - Best-effort rate history in PostgreSQL
//! - Simulated random-walk feed for development and load tests
//!
//! # Example
//!
//! ```rust,ignore
//! use fxwallet_fx::{QuoteAggregator, AggregatorConfig, SimulatedRateSource};
//!
//! let aggregator = Arc::new(QuoteAggregator::new(
//!     Arc::new(SimulatedRateSource::new()),
//!     None,
//!     AggregatorConfig::default(),
//! ));
//! let handle = aggregator.start(shutdown.clone())?;
//!
//! let entry = aggregator.get_rate(Currency::Usd, Currency::Rub);
//! ```

pub mod aggregator;
pub mod source;
pub mod table;
pub mod history;
pub mod error;

pub use aggregator::{AggregatorConfig, QuoteAggregator, RefreshReport};
pub use source::{RateSource, SimulatedRateSource};
#[cfg(any(test, feature = "test-utils"))]
pub use source::MockRateSource;
pub use table::{QuoteTable, RateEntry};
pub use history::{HistoryStore, MemoryHistoryStore, PgHistoryStore, RateSample};
pub use error::{FxError, FxResult};
