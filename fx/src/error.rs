//! Quote aggregator error types.

use fxwallet_common::CurrencyPair;
use thiserror::Error;

/// Errors that can occur in the quote aggregator and its collaborators.
#[derive(Debug, Error)]
pub enum FxError {
    /// Rate not available for the requested currency pair.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyPair),

    /// Source returned a value that cannot be a market rate.
    #[error("Invalid rate {value} for {pair}")]
    InvalidRate { pair: CurrencyPair, value: f64 },

    /// Rate source failed.
    #[error("Rate source error: {0}")]
    ProviderError(String),

    /// History store failed.
    #[error("History store error: {0}")]
    HistoryError(String),

    /// The refresh loop was already started.
    #[error("Quote aggregator already started")]
    AlreadyStarted,
}

impl From<sqlx::Error> for FxError {
    fn from(e: sqlx::Error) -> Self {
        FxError::HistoryError(e.to_string())
    }
}

/// Result type for quote operations.
pub type FxResult<T> = Result<T, FxError>;
