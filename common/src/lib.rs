//! FxWallet Common Types
//!
//! Shared data model for the quote aggregator and the transactional ledger:
//! currency codes, wallet and transaction records, identifiers, the error
//! taxonomy and the minor-unit conversion arithmetic.

pub mod identifiers;
pub mod monetary;
pub mod wallet;
pub mod transaction;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use wallet::*;
pub use transaction::*;
pub use error::*;
pub use time::*;
