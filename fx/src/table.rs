//! In-memory quote table with per-pair trend tracking.
//!
//! The table is keyed by base currency; each base owns one row holding an
//! entry for every other supported currency. Each row sits behind its own
//! reader/writer lock: readers of different bases never contend, and a
//! refresh of `USD/EUR` only blocks readers of the `USD` row for the duration
//! of a single entry replace. A single table-wide lock would be simpler but
//! would serialise every refresh task of a cycle against all readers.

use std::collections::HashMap;

use fxwallet_common::{Currency, CurrencyPair};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Latest known rate for a pair and whether it rose on the last refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    /// Latest rate. Zero means no refresh has succeeded yet.
    pub value: f64,
    /// `true` iff `value` is strictly greater than the value it replaced.
    pub is_increasing: bool,
}

impl RateEntry {
    /// Entry for a pair that has never been refreshed.
    pub const UNKNOWN: RateEntry = RateEntry {
        value: 0.0,
        is_increasing: false,
    };

    /// Whether this entry carries a real rate.
    pub fn is_known(&self) -> bool {
        self.value > 0.0
    }

    /// Entry that replaces `self` with `value`.
    pub fn next(&self, value: f64) -> RateEntry {
        RateEntry {
            value,
            is_increasing: value > self.value,
        }
    }
}

/// Concurrently readable table of `base → (quote → RateEntry)`.
#[derive(Debug)]
pub struct QuoteTable {
    rows: HashMap<Currency, RwLock<HashMap<Currency, RateEntry>>>,
}

impl QuoteTable {
    /// Create a table tracking `bases`, each against every other currency.
    pub fn new(bases: impl IntoIterator<Item = Currency>) -> Self {
        let rows = bases
            .into_iter()
            .map(|base| {
                let row = base.others().map(|quote| (quote, RateEntry::UNKNOWN)).collect();
                (base, RwLock::new(row))
            })
            .collect();

        Self { rows }
    }

    /// Create a table tracking every supported currency as a base.
    pub fn with_all_bases() -> Self {
        Self::new(Currency::ALL)
    }

    /// Latest entry for the pair, or [`RateEntry::UNKNOWN`] if untracked.
    pub fn get(&self, from: Currency, to: Currency) -> RateEntry {
        self.rows
            .get(&from)
            .and_then(|row| row.read().get(&to).copied())
            .unwrap_or(RateEntry::UNKNOWN)
    }

    /// Replace the entry for a tracked pair, deriving the trend from the
    /// stored value. Returns `None` and changes nothing for untracked pairs.
    pub fn update(&self, from: Currency, to: Currency, value: f64) -> Option<RateEntry> {
        let row = self.rows.get(&from)?;
        let mut row = row.write();
        let entry = row.get_mut(&to)?;
        *entry = entry.next(value);
        Some(*entry)
    }

    /// Every tracked pair, sorted.
    pub fn pairs(&self) -> Vec<CurrencyPair> {
        let mut pairs: Vec<CurrencyPair> = self
            .rows
            .iter()
            .flat_map(|(base, row)| {
                row.read()
                    .keys()
                    .map(|quote| CurrencyPair::new(*base, *quote))
                    .collect::<Vec<_>>()
            })
            .collect();
        pairs.sort();
        pairs
    }

    /// Copy of one base row, sorted by quote currency.
    pub fn snapshot(&self, base: Currency) -> Vec<(Currency, RateEntry)> {
        let mut entries: Vec<(Currency, RateEntry)> = self
            .rows
            .get(&base)
            .map(|row| row.read().iter().map(|(q, e)| (*q, *e)).collect())
            .unwrap_or_default();
        entries.sort_by_key(|(quote, _)| *quote);
        entries
    }

    /// Number of tracked pairs.
    pub fn len(&self) -> usize {
        self.rows.values().map(|row| row.read().len()).sum()
    }

    /// Whether no pair is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
