//! Timing constants for FxWallet.

/// Default timings shared by the node and the simulator.
pub mod constants {
    use std::time::Duration;

    /// Quote table refresh interval (10 seconds).
    pub fn refresh_interval() -> Duration {
        Duration::from_secs(10)
    }

    /// Simulated feed drift step (5 seconds).
    pub fn feed_step() -> Duration {
        Duration::from_secs(5)
    }

    /// Database connect and ping timeout (2 seconds).
    pub fn connect_timeout() -> Duration {
        Duration::from_secs(2)
    }

    /// Deadline for a single ledger operation (2 seconds).
    pub fn operation_timeout() -> Duration {
        Duration::from_secs(2)
    }

    /// Largest accepted difference between a client-quoted and the current rate.
    pub const RATE_TOLERANCE: f64 = 0.00001;
}

#[cfg(test)]
mod tests {
    use super::constants;

    #[test]
    fn test_feed_moves_faster_than_refresh() {
        assert!(constants::feed_step() < constants::refresh_interval());
        assert!(constants::RATE_TOLERANCE > 0.0);
    }
}
