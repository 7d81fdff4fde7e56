//! Monetary types for FxWallet.
//!
//! Balances are integer minor units; rates are `f64`. Conversion between
//! currencies always truncates toward negative infinity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported currency codes. The set is closed and fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "RUB")]
    Rub,
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "JPY")]
    Jpy,
    #[serde(rename = "CHF")]
    Chf,
    #[serde(rename = "CNY")]
    Cny,
}

impl Currency {
    /// Every supported currency, in listing order.
    pub const ALL: [Currency; 7] = [
        Currency::Rub,
        Currency::Eur,
        Currency::Usd,
        Currency::Gbp,
        Currency::Jpy,
        Currency::Chf,
        Currency::Cny,
    ];

    /// Get the ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Rub => "RUB",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Chf => "CHF",
            Currency::Cny => "CNY",
        }
    }

    /// All supported currencies except `self`.
    pub fn others(self) -> impl Iterator<Item = Currency> {
        Self::ALL.into_iter().filter(move |c| *c != self)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = UnknownCurrencyError;

    /// Parse an exact, case-sensitive currency code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.code() == s)
            .ok_or_else(|| UnknownCurrencyError(s.to_string()))
    }
}

/// Error when a currency code is outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported currency: {0:?}")]
pub struct UnknownCurrencyError(pub String);

/// An ordered currency pair. `base` is the currency being sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (left side of the pair).
    pub base: Currency,
    /// Quote currency (right side of the pair).
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// Whether both sides name the same currency.
    pub fn is_self_pair(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Convert a minor-unit amount at `rate`, truncating fractional minor units.
///
/// `floor(amount × rate)` computed in `f64`. The truncation always favours
/// the ledger, never the user. Results beyond the `i64` range saturate.
pub fn exchange_amount(amount: i64, rate: f64) -> i64 {
    (amount as f64 * rate).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_currency_codes_round_trip() {
        for currency in Currency::ALL {
            assert_eq!(currency.code().parse::<Currency>().unwrap(), currency);
        }
    }

    #[test]
    fn test_currency_parse_is_case_sensitive() {
        assert!("usd".parse::<Currency>().is_err());
        assert!("XYZ".parse::<Currency>().is_err());
    }

    #[test]
    fn test_unknown_currency_error() {
        let err = "XYZ".parse::<Currency>().unwrap_err();
        assert_eq!(err, UnknownCurrencyError("XYZ".to_string()));
        assert_eq!(err.to_string(), "Unsupported currency: \"XYZ\"");

        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_currency_serializes_as_code() {
        assert_eq!(serde_json::to_string(&Currency::Cny).unwrap(), "\"CNY\"");
        let parsed: Currency = serde_json::from_str("\"GBP\"").unwrap();
        assert_eq!(parsed, Currency::Gbp);
    }

    #[test]
    fn test_others_excludes_self() {
        let others: Vec<_> = Currency::Usd.others().collect();
        assert_eq!(others.len(), Currency::ALL.len() - 1);
        assert!(!others.contains(&Currency::Usd));
    }

    #[test]
    fn test_pair_display() {
        let pair = CurrencyPair::new(Currency::Usd, Currency::Eur);
        assert_eq!(pair.to_string(), "USD/EUR");
        assert!(!pair.is_self_pair());
    }

    #[test]
    fn test_exchange_amount_truncates() {
        assert_eq!(exchange_amount(100, 1.239), 123);
        assert_eq!(exchange_amount(1000, 0.016), 16);
        assert_eq!(exchange_amount(0, 60.85), 0);
        assert_eq!(exchange_amount(3, 0.5), 1);
    }

    proptest! {
        #[test]
        fn prop_exchange_amount_never_rounds_up(amount in 0i64..1_000_000_000, rate in 0.0001f64..1000.0) {
            let exact = amount as f64 * rate;
            let converted = exchange_amount(amount, rate);
            prop_assert!(converted as f64 <= exact);
            prop_assert!(exact - (converted as f64) < 1.0);
        }
    }
}
