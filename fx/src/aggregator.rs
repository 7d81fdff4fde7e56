//! Quote aggregator: the refresh loop around the quote table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fxwallet_common::{constants, Currency, CurrencyPair};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FxError, FxResult};
use crate::history::{HistoryStore, RateSample};
use crate::source::RateSource;
use crate::table::{QuoteTable, RateEntry};

/// Configuration for the quote aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Time between refresh cycles.
    pub refresh_interval: Duration,
    /// Base currencies tracked against every other currency.
    pub bases: Vec<Currency>,
    /// Whether refreshed samples are written to the history store.
    pub record_history: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: constants::refresh_interval(),
            bases: vec![Currency::Rub, Currency::Eur, Currency::Usd],
            record_history: true,
        }
    }
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// Timestamp shared by every sample of the cycle.
    pub sampled_at: DateTime<Utc>,
    /// Pairs whose entry was replaced.
    pub updated: usize,
    /// Pairs whose fetch failed; their entries are unchanged.
    pub failed: usize,
    /// Samples the history store refused.
    pub history_failures: usize,
}

/// Keeps the quote table fresh and serves non-blocking reads from it.
pub struct QuoteAggregator {
    table: Arc<QuoteTable>,
    source: Arc<dyn RateSource>,
    history: Option<Arc<dyn HistoryStore>>,
    config: AggregatorConfig,
    started: AtomicBool,
}

impl QuoteAggregator {
    /// Create an aggregator with a zeroed table for `config.bases`.
    pub fn new(
        source: Arc<dyn RateSource>,
        history: Option<Arc<dyn HistoryStore>>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            table: Arc::new(QuoteTable::new(config.bases.iter().copied())),
            source,
            history,
            config,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the refresh loop and return immediately.
    ///
    /// The first cycle runs at once, then one per `refresh_interval`. The loop
    /// exits when `shutdown` is cancelled. A cycle still waiting on the source
    /// at that point is abandoned and its outstanding fetches are aborted.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> FxResult<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FxError::AlreadyStarted);
        }

        info!(
            source = self.source.name(),
            pairs = self.table.len(),
            interval_ms = self.config.refresh_interval.as_millis() as u64,
            "Starting quote aggregator"
        );

        let aggregator = self.clone();
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(aggregator.config.refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        info!("Stop consuming quotes");
                        break;
                    }
                    _ = ticker.tick() => {
                        tokio::select! {
                            biased;
                            () = shutdown.cancelled() => {
                                info!("Refresh cycle abandoned at shutdown");
                                break;
                            }
                            _ = aggregator.refresh() => {}
                        }
                    }
                }
            }
        }))
    }

    /// Latest entry for the pair. Never waits on the rate source.
    ///
    /// A pair that was never refreshed yields [`RateEntry::UNKNOWN`].
    pub fn get_rate(&self, from: Currency, to: Currency) -> RateEntry {
        self.table.get(from, to)
    }

    /// The underlying table.
    pub fn table(&self) -> &QuoteTable {
        &self.table
    }

    /// Aggregator configuration.
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Run one refresh cycle: fetch every tracked pair concurrently, wait for
    /// all of them, then append the new samples to history.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn refresh(&self) -> RefreshReport {
        let sampled_at = Utc::now();
        let mut fetches = JoinSet::new();

        for pair in self.table.pairs() {
            let source = self.source.clone();
            let table = self.table.clone();
            fetches.spawn(async move {
                let result = Self::refresh_pair(source.as_ref(), &table, pair, sampled_at).await;
                (pair, result)
            });
        }

        let mut samples = Vec::new();
        let mut failed = 0;
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((_, Ok(sample))) => samples.push(sample),
                Ok((pair, Err(e))) => {
                    warn!(pair = %pair, error = %e, "Failed to get quote");
                    failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Quote fetch task failed");
                    failed += 1;
                }
            }
        }

        let history_failures = self.record(&samples).await;

        debug!(
            updated = samples.len(),
            failed,
            history_failures,
            "Quote refresh cycle complete"
        );

        RefreshReport {
            sampled_at,
            updated: samples.len(),
            failed,
            history_failures,
        }
    }

    async fn refresh_pair(
        source: &dyn RateSource,
        table: &QuoteTable,
        pair: CurrencyPair,
        sampled_at: DateTime<Utc>,
    ) -> FxResult<RateSample> {
        let value = source.get_rate(pair.base, pair.quote).await?;
        if !value.is_finite() || value <= 0.0 {
            return Err(FxError::InvalidRate { pair, value });
        }

        let entry = table
            .update(pair.base, pair.quote, value)
            .ok_or(FxError::RateNotAvailable(pair))?;
        debug!(pair = %pair, value, is_increasing = entry.is_increasing, "Quote updated");

        Ok(RateSample {
            sampled_at,
            from: pair.base,
            to: pair.quote,
            rate: value,
        })
    }

    async fn record(&self, samples: &[RateSample]) -> usize {
        let history = match &self.history {
            Some(history) if self.config.record_history => history,
            _ => return 0,
        };

        let mut failures = 0;
        for sample in samples {
            if let Err(e) = history.save_sample(sample).await {
                warn!(
                    from = %sample.from,
                    to = %sample.to,
                    error = %e,
                    "Failed to save rate sample"
                );
                failures += 1;
            }
        }
        failures
    }
}
