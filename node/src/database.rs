//! Connection lifecycle for the relational store.
//!
//! Connect, ping and close errors are fatal to startup and shutdown; they never
//! surface from individual ledger operations.

use std::time::Duration;

use fxwallet_common::{Result, WalletError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::config::DatabaseConfig;

/// Open the pool and make sure the server answers.
#[instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| WalletError::ConnectionFailed(e.to_string()))?;

    ping(&pool, config.connect_timeout).await?;

    info!("Connected to database");
    Ok(pool)
}

/// Round-trip a trivial query.
pub async fn ping(pool: &PgPool, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(pool))
        .await
        .map_err(|_| WalletError::PingFailed(format!("no answer within {timeout:?}")))?
        .map_err(|e| WalletError::PingFailed(e.to_string()))?;
    Ok(())
}

/// Close every pooled connection, waiting at most `timeout`.
pub async fn close(pool: &PgPool, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, pool.close())
        .await
        .map_err(|_| {
            WalletError::CloseConnectionFailed(format!("connections still open after {timeout:?}"))
        })?;

    info!("Database connections closed");
    Ok(())
}
