//! Error types for FxWallet ledger and pricing operations.

use crate::{Currency, UserId, WalletId};
use thiserror::Error;

/// Main error type for ledger and exchange operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    /// Referenced wallet or user does not exist, or is not owned by the caller.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation would drive a balance negative.
    #[error("Not enough money in wallet {wallet_id}: balance {balance}, requested {requested}")]
    NotEnoughMoney {
        wallet_id: WalletId,
        balance: i64,
        requested: i64,
    },

    /// Amount rejected before touching the store.
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: i64, reason: &'static str },

    /// Wallet currency differs from the declared currency.
    #[error("Currency mismatch on wallet {wallet_id}: expected {expected}, got {actual}")]
    CurrencyMismatch {
        wallet_id: WalletId,
        expected: Currency,
        actual: Currency,
    },

    /// No rate has been observed for the pair yet.
    #[error("Rate unknown for {from}/{to}")]
    RateUnknown { from: Currency, to: Currency },

    /// The client priced the exchange at a rate that is no longer current.
    #[error("Rate changed for {from}/{to}: quoted {quoted}, current {current}")]
    RateChanged {
        from: Currency,
        to: Currency,
        quoted: f64,
        current: f64,
    },

    /// Operation exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Service is not accepting requests (starting up or shutting down).
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Could not open a connection to the store.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Store connection opened but did not answer a ping.
    #[error("Failed to ping database: {0}")]
    PingFailed(String),

    /// Store connection did not close cleanly.
    #[error("Failed to close connection to database: {0}")]
    CloseConnectionFailed(String),

    /// Unclassified store error, message kept verbatim.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification used at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    BadRequest,
    Unavailable,
    Internal,
}

impl WalletError {
    /// Wallet missing from the store.
    pub fn wallet_not_found(wallet_id: WalletId) -> Self {
        WalletError::NotFound(format!("wallet {wallet_id}"))
    }

    /// Wallet missing from the user's own wallet set.
    pub fn wallet_not_owned(wallet_id: WalletId, user_id: UserId) -> Self {
        WalletError::NotFound(format!("wallet {wallet_id} for user {user_id}"))
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WalletError::Timeout(_)
                | WalletError::Unavailable(_)
                | WalletError::ConnectionFailed(_)
                | WalletError::PingFailed(_)
                | WalletError::RateUnknown { .. }
                | WalletError::RateChanged { .. }
        )
    }

    /// Get the boundary classification.
    pub fn class(&self) -> ErrorClass {
        match self {
            WalletError::NotFound(_) => ErrorClass::NotFound,
            WalletError::NotEnoughMoney { .. } | WalletError::RateChanged { .. } => {
                ErrorClass::Conflict
            }
            WalletError::InvalidAmount { .. } | WalletError::CurrencyMismatch { .. } => {
                ErrorClass::BadRequest
            }
            WalletError::RateUnknown { .. }
            | WalletError::Timeout(_)
            | WalletError::Unavailable(_)
            | WalletError::ConnectionFailed(_)
            | WalletError::PingFailed(_) => ErrorClass::Unavailable,
            WalletError::CloseConnectionFailed(_)
            | WalletError::Database(_)
            | WalletError::Configuration(_) => ErrorClass::Internal,
        }
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            WalletError::NotFound(_) => "NOT_FOUND",
            WalletError::NotEnoughMoney { .. } => "NOT_ENOUGH_MONEY",
            WalletError::InvalidAmount { .. } => "INVALID_AMOUNT",
            WalletError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            WalletError::RateUnknown { .. } => "RATE_UNKNOWN",
            WalletError::RateChanged { .. } => "RATE_CHANGED",
            WalletError::Timeout(_) => "TIMEOUT",
            WalletError::Unavailable(_) => "UNAVAILABLE",
            WalletError::ConnectionFailed(_) => "CONNECTION_FAILED",
            WalletError::PingFailed(_) => "PING_FAILED",
            WalletError::CloseConnectionFailed(_) => "CLOSE_CONNECTION_FAILED",
            WalletError::Database(_) => "DATABASE_ERROR",
            WalletError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for FxWallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_classes() {
        assert_eq!(
            WalletError::wallet_not_found(WalletId::new(1)).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            WalletError::NotEnoughMoney {
                wallet_id: WalletId::new(1),
                balance: 0,
                requested: 1,
            }
            .class(),
            ErrorClass::Conflict
        );
        assert_eq!(
            WalletError::Database("relation does not exist".into()).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn test_unavailable_is_retryable() {
        let err = WalletError::Unavailable("node is Stopped".into());
        assert_eq!(err.class(), ErrorClass::Unavailable);
        assert_eq!(err.error_code(), "UNAVAILABLE");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_ownership_violation_is_not_found() {
        let err = WalletError::wallet_not_owned(WalletId::new(3), UserId::new(9));
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "Not found: wallet 3 for user 9");
    }

    #[test]
    fn test_database_message_is_verbatim() {
        let err = WalletError::Database("deadlock detected".into());
        assert_eq!(err.to_string(), "Database error: deadlock detected");
        assert!(!err.is_retryable());
    }
}
