//! Postgres pool for the scatter-gather tables

use geocore_common::{HarvestError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Seconds to wait for a pooled connection.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connect and bring the schema up to date
pub async fn create_pool(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS))
        .connect(url)
        .await
        .map_err(|e| HarvestError::Config(format!("failed to connect to database: {}", e)))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| HarvestError::State(format!("migration failed: {}", e)))?;

    tracing::info!(max_connections, "Database connection pool created");

    Ok(pool)
}
