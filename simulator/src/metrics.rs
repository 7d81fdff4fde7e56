//! Simulation metrics.

use serde::Serialize;

/// Latency samples retained for averages and percentiles.
const LATENCY_WINDOW: usize = 10_000;

/// Simulation metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Ledger operations attempted.
    pub total_operations: u64,
    /// Operations that committed.
    pub successful_operations: u64,
    /// Operations refused by a business rule (not enough money, stale rate).
    pub rejected_operations: u64,
    /// Operations that failed for any other reason.
    pub failed_operations: u64,
    /// Ring of the most recent committed-operation latencies (microseconds).
    #[serde(skip)]
    latencies: Vec<u64>,
    /// Slot the next sample overwrites once the ring is full.
    #[serde(skip)]
    cursor: usize,
    #[serde(skip)]
    window: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::with_latency_window(LATENCY_WINDOW)
    }

    /// Create metrics that keep at most `window` latency samples.
    pub fn with_latency_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            total_operations: 0,
            successful_operations: 0,
            rejected_operations: 0,
            failed_operations: 0,
            latencies: Vec::with_capacity(window),
            cursor: 0,
            window,
        }
    }

    /// Record a committed operation.
    pub fn record_success(&mut self, latency_us: u64) {
        self.total_operations += 1;
        self.successful_operations += 1;

        if self.latencies.len() < self.window {
            self.latencies.push(latency_us);
        } else {
            self.latencies[self.cursor] = latency_us;
        }
        self.cursor = (self.cursor + 1) % self.window;
    }

    /// Record an operation refused by a business rule.
    pub fn record_rejection(&mut self) {
        self.total_operations += 1;
        self.rejected_operations += 1;
    }

    /// Record a failed operation.
    pub fn record_failure(&mut self) {
        self.total_operations += 1;
        self.failed_operations += 1;
    }

    /// Mean latency over the retained window, 0 when nothing committed.
    pub fn average_latency_us(&self) -> u64 {
        self.latencies
            .iter()
            .sum::<u64>()
            .checked_div(self.latencies.len() as u64)
            .unwrap_or(0)
    }

    /// Median latency.
    pub fn p50_latency_us(&self) -> u64 {
        self.nearest_rank(0.50)
    }

    /// Tail latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.nearest_rank(0.99)
    }

    // Nearest-rank percentile: the smallest sample with at least `q` of the
    // window at or below it.
    fn nearest_rank(&self, q: f64) -> u64 {
        let n = self.latencies.len();
        if n == 0 {
            return 0;
        }

        let rank = ((q * n as f64).ceil() as usize).clamp(1, n);
        let mut scratch = self.latencies.clone();
        *scratch.select_nth_unstable(rank - 1).1
    }

    /// Share of attempted operations that committed.
    pub fn success_rate(&self) -> f64 {
        match self.total_operations {
            0 => 0.0,
            total => self.successful_operations as f64 / total as f64,
        }
    }

    /// Operations attempted per second over `elapsed_secs`.
    pub fn throughput(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs > 0.0 {
            self.total_operations as f64 / elapsed_secs
        } else {
            0.0
        }
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_success(100);
        metrics.record_success(200);
        metrics.record_success(150);
        metrics.record_rejection();
        metrics.record_failure();

        assert_eq!(metrics.total_operations, 5);
        assert_eq!(metrics.successful_operations, 3);
        assert_eq!(metrics.rejected_operations, 1);
        assert_eq!(metrics.failed_operations, 1);
        assert_eq!(metrics.average_latency_us(), 150);
        assert_eq!(metrics.p50_latency_us(), 150);
        assert_eq!(metrics.p99_latency_us(), 200);
        assert_eq!(metrics.success_rate(), 0.6);
        assert_eq!(metrics.throughput(2.5), 2.0);
    }

    #[test]
    fn test_latency_window_keeps_most_recent() {
        let mut metrics = SimulationMetrics::with_latency_window(4);

        for latency in [1_000, 1_000, 10, 20, 30, 40] {
            metrics.record_success(latency);
        }

        assert_eq!(metrics.successful_operations, 6);
        assert_eq!(metrics.average_latency_us(), 25);
        assert_eq!(metrics.p50_latency_us(), 20);
        assert_eq!(metrics.p99_latency_us(), 40);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = SimulationMetrics::default();
        assert_eq!(metrics.p99_latency_us(), 0);
        assert_eq!(metrics.success_rate(), 0.0);
    }
}
