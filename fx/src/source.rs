//! Rate source trait and implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use fxwallet_common::{Currency, CurrencyPair};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{FxError, FxResult};

/// A fallible lookup of the raw rate for an ordered currency pair.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Get the current rate for `from → to`.
    async fn get_rate(&self, from: Currency, to: Currency) -> FxResult<f64>;
}

/// Currency every simulated cross rate is routed through.
const PIVOT: Currency = Currency::Rub;

/// Random-walk quote feed seeded with fixed market levels.
///
/// Pairs missing from the table are served as a cross rate through RUB.
pub struct SimulatedRateSource {
    quotes: DashMap<CurrencyPair, f64>,
    rng: Mutex<StdRng>,
}

impl SimulatedRateSource {
    /// Create a feed with an entropy-seeded walk.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a feed with a reproducible walk.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        use Currency::*;

        let seed_quotes = [
            (Rub, Usd, 0.016),
            (Rub, Eur, 0.016),
            (Rub, Jpy, 2.31),
            (Rub, Chf, 0.016),
            (Rub, Gbp, 0.014),
            (Rub, Cny, 0.12),
            (Usd, Rub, 60.85),
            (Usd, Eur, 0.97),
            (Eur, Usd, 1.03),
            (Eur, Rub, 62.95),
            (Chf, Rub, 63.73),
            (Cny, Rub, 8.55),
            (Jpy, Rub, 0.43),
            (Gbp, Rub, 72.34),
        ];

        let quotes = DashMap::new();
        for (base, quote, value) in seed_quotes {
            quotes.insert(CurrencyPair::new(base, quote), value);
        }

        Self {
            quotes,
            rng: Mutex::new(rng),
        }
    }

    /// Override the level of a directly quoted pair.
    pub fn set_quote(&self, from: Currency, to: Currency, value: f64) {
        self.quotes.insert(CurrencyPair::new(from, to), value);
    }

    /// Current level for the pair, direct or crossed through RUB.
    pub fn quote(&self, from: Currency, to: Currency) -> Option<f64> {
        if from == to {
            return None;
        }

        if let Some(direct) = self.quotes.get(&CurrencyPair::new(from, to)) {
            return Some(*direct);
        }

        let into_pivot = *self.quotes.get(&CurrencyPair::new(from, PIVOT))?;
        let out_of_pivot = *self.quotes.get(&CurrencyPair::new(PIVOT, to))?;
        Some(into_pivot * out_of_pivot)
    }

    /// Move every directly quoted pair by up to ±0.1%.
    pub fn step(&self) {
        let mut rng = self.rng.lock();
        for mut quote in self.quotes.iter_mut() {
            let drift = *quote / 500.0 * (rng.gen::<f64>() - 0.5);
            *quote += drift;
        }
    }

    /// Spawn the drift loop; it steps every `step` until `shutdown` fires.
    pub fn spawn_drift(self: &Arc<Self>, step: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let feed = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(step);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; keep the seeded levels for one step.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        info!("Simulated feed stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        feed.step();
                        debug!(pairs = feed.quotes.len(), "Simulated feed moved");
                    }
                }
            }
        })
    }
}

impl Default for SimulatedRateSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateSource for SimulatedRateSource {
    fn name(&self) -> &str {
        "SIMULATED"
    }

    async fn get_rate(&self, from: Currency, to: Currency) -> FxResult<f64> {
        self.quote(from, to)
            .ok_or(FxError::RateNotAvailable(CurrencyPair::new(from, to)))
    }
}

/// Scriptable rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    rates: DashMap<CurrencyPair, f64>,
    failing: dashmap::DashSet<CurrencyPair>,
    calls: std::sync::atomic::AtomicUsize,
    delay: Option<Duration>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// Create a new mock source with no rates.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: DashMap::new(),
            failing: dashmap::DashSet::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep this long inside every lookup.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the rate served for a pair.
    pub fn set_rate(&self, from: Currency, to: Currency, value: f64) {
        self.rates.insert(CurrencyPair::new(from, to), value);
    }

    /// Make lookups for a pair fail until [`MockRateSource::recover`].
    pub fn fail(&self, from: Currency, to: Currency) {
        self.failing.insert(CurrencyPair::new(from, to));
    }

    /// Stop failing lookups for a pair.
    pub fn recover(&self, from: Currency, to: Currency) {
        self.failing.remove(&CurrencyPair::new(from, to));
    }

    /// Number of lookups served or failed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_rate(&self, from: Currency, to: Currency) -> FxResult<f64> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let pair = CurrencyPair::new(from, to);
        if self.failing.contains(&pair) {
            return Err(FxError::ProviderError(format!("{} unavailable for {pair}", self.name)));
        }

        self.rates
            .get(&pair)
            .map(|r| *r)
            .ok_or(FxError::RateNotAvailable(pair))
    }
}
