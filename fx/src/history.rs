//! Rate history persistence.
//!
//! History is best-effort: the aggregator logs a failed write and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxwallet_common::Currency;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FxError, FxResult};

/// One refreshed rate. All samples of a refresh cycle share `sampled_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    pub sampled_at: DateTime<Utc>,
    pub from: Currency,
    pub to: Currency,
    pub rate: f64,
}

/// Durable append-only store of rate samples.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one sample.
    async fn save_sample(&self, sample: &RateSample) -> FxResult<()>;

    /// Samples for a pair taken at or after `since`, oldest first.
    async fn list_samples(
        &self,
        from: Currency,
        to: Currency,
        since: DateTime<Utc>,
    ) -> FxResult<Vec<RateSample>>;
}

const HISTORY_SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS courses (
        id BIGSERIAL PRIMARY KEY,
        sampled_at TIMESTAMPTZ NOT NULL,
        from_currency TEXT NOT NULL,
        to_currency TEXT NOT NULL,
        course DOUBLE PRECISION NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS courses_pair_time_idx
        ON courses (from_currency, to_currency, sampled_at)
    "#,
];

/// PostgreSQL-backed history in the `courses` table.
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    /// Create a store on an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `courses` table if it does not exist.
    pub async fn migrate(&self) -> FxResult<()> {
        for statement in HISTORY_SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn row_to_sample(row: &sqlx::postgres::PgRow) -> FxResult<RateSample> {
        let parse = |column: &str| -> FxResult<Currency> {
            let code: String = row.try_get(column)?;
            code.parse::<Currency>()
                .map_err(|e| FxError::HistoryError(e.to_string()))
        };

        Ok(RateSample {
            sampled_at: row.try_get("sampled_at")?,
            from: parse("from_currency")?,
            to: parse("to_currency")?,
            rate: row.try_get("course")?,
        })
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn save_sample(&self, sample: &RateSample) -> FxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO courses (sampled_at, from_currency, to_currency, course)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(sample.sampled_at)
        .bind(sample.from.code())
        .bind(sample.to.code())
        .bind(sample.rate)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_samples(
        &self,
        from: Currency,
        to: Currency,
        since: DateTime<Utc>,
    ) -> FxResult<Vec<RateSample>> {
        let rows = sqlx::query(
            r#"
            SELECT sampled_at, from_currency, to_currency, course
            FROM courses
            WHERE from_currency = $1 AND to_currency = $2 AND sampled_at >= $3
            ORDER BY sampled_at, id
            "#,
        )
        .bind(from.code())
        .bind(to.code())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_sample).collect()
    }
}

/// Process-local history, used by the simulator and tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    samples: Mutex<Vec<RateSample>>,
    unavailable: AtomicBool,
}

impl MemoryHistoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// Whether nothing was stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save_sample(&self, sample: &RateSample) -> FxResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FxError::HistoryError("history store unavailable".to_string()));
        }
        self.samples.lock().push(sample.clone());
        Ok(())
    }

    async fn list_samples(
        &self,
        from: Currency,
        to: Currency,
        since: DateTime<Utc>,
    ) -> FxResult<Vec<RateSample>> {
        let mut samples: Vec<RateSample> = self
            .samples
            .lock()
            .iter()
            .filter(|s| s.from == from && s.to == to && s.sampled_at >= since)
            .cloned()
            .collect();
        samples.sort_by_key(|s| s.sampled_at);
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(at: DateTime<Utc>, from: Currency, to: Currency, rate: f64) -> RateSample {
        RateSample {
            sampled_at: at,
            from,
            to,
            rate,
        }
    }

    #[tokio::test]
    async fn test_memory_history_filters_by_pair_and_time() {
        let store = MemoryHistoryStore::new();
        let now = Utc::now();

        store.save_sample(&sample(now - Duration::minutes(10), Currency::Usd, Currency::Rub, 60.0)).await.unwrap();
        store.save_sample(&sample(now - Duration::minutes(1), Currency::Usd, Currency::Rub, 61.0)).await.unwrap();
        store.save_sample(&sample(now, Currency::Usd, Currency::Rub, 62.0)).await.unwrap();
        store.save_sample(&sample(now, Currency::Eur, Currency::Rub, 63.0)).await.unwrap();

        let recent = store
            .list_samples(Currency::Usd, Currency::Rub, now - Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].rate, 61.0);
        assert_eq!(recent[1].rate, 62.0);
    }

    #[tokio::test]
    async fn test_memory_history_unavailable() {
        let store = MemoryHistoryStore::new();
        store.set_unavailable(true);

        let result = store
            .save_sample(&sample(Utc::now(), Currency::Usd, Currency::Eur, 0.97))
            .await;

        assert!(matches!(result, Err(FxError::HistoryError(_))));
        assert!(store.is_empty());
    }
}
