//! Identifier types for FxWallet entities.
//!
//! All identifiers are database-assigned 64-bit keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a wallet row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(i64);

impl WalletId {
    /// Wrap a raw database key.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw database key.
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for WalletId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Unique identifier for a user (wallet owner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Wrap a raw database key.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw database key.
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Unique identifier for a ledger transaction (audit row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(i64);

impl TransactionId {
    /// Wrap a raw database key.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw database key.
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
