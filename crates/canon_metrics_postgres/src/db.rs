//! Pool construction.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use canon_metrics_core::ports::Result;

use crate::sqlx_types::classify;

/// Connect a pool to the canonical metrics database.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(classify)?;
    Ok(pool)
}
